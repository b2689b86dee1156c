use std::path::PathBuf;
use thiserror::Error;

/// Failures surfaced by the transcription orchestrator.
///
/// Only errors raised before a session exists reach the caller; anything that
/// happens inside a running recognition loop ends that session and is logged.
#[derive(Error, Debug)]
pub enum TranscriptionError {
    #[error("audio source not found or unreadable: {}", .0.display())]
    SourceNotFound(PathBuf),

    #[error("audio conversion failed: {0}")]
    Conversion(String),

    #[error("recognition stream error: {0}")]
    RecognitionStream(String),

    #[error("broadcast publish failed: {0}")]
    Publish(String),

    #[error("transcript export failed: {0}")]
    Export(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TranscriptionError>;
