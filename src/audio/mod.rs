pub mod backend;
pub mod convert;
pub mod file;
pub mod resample;

#[cfg(feature = "microphone")]
pub mod microphone;

pub use backend::{
    AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioFrame, AudioSource, FrameAssembler,
};
pub use convert::{needs_conversion, AudioConverter, WavConverter};
pub use file::{AudioFile, FileBackend};
pub use resample::{resample, resample_interleaved};
