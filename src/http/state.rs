use crate::audio::AudioConverter;
use crate::session::SessionRegistry;
use std::path::PathBuf;
use std::sync::Arc;

/// Upload, export and browser-access settings for the API
#[derive(Debug, Clone)]
pub struct ApiSettings {
    /// Where uploaded audio is written before recognition
    pub upload_dir: PathBuf,
    /// Where `/save/` writes transcripts
    pub transcript_dir: PathBuf,
    pub max_upload_bytes: usize,
    /// Sample rate an upload must already have to skip conversion
    pub sample_rate: u32,
    /// Browser origins allowed by CORS; empty disables the CORS layer
    pub allowed_origins: Vec<String>,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            upload_dir: std::env::temp_dir(),
            transcript_dir: PathBuf::from("transcripts"),
            max_upload_bytes: 200 * 1024 * 1024,
            sample_rate: 16000,
            allowed_origins: Vec::new(),
        }
    }
}

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Active transcription sessions (user_id → session)
    pub registry: SessionRegistry,
    pub converter: Arc<dyn AudioConverter>,
    pub settings: Arc<ApiSettings>,
}

impl AppState {
    pub fn new(
        registry: SessionRegistry,
        converter: Arc<dyn AudioConverter>,
        settings: ApiSettings,
    ) -> Self {
        Self {
            registry,
            converter,
            settings: Arc::new(settings),
        }
    }
}
