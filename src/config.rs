use anyhow::Result;
use serde::Deserialize;
use std::path::PathBuf;

/// Environment overrides use this prefix, e.g.
/// `LIVE_TRANSCRIPTION__NATS__URL=nats://broker:4222`.
const ENV_PREFIX: &str = "LIVE_TRANSCRIPTION";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub speech: SpeechConfig,
    pub nats: NatsConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
    #[serde(default)]
    pub cors: CorsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CorsConfig {
    /// Origins allowed to call the API from a browser. Empty disables CORS.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpeechConfig {
    /// Recognition language passed to the STT service
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_channels")]
    pub channels: u16,
    /// Size of each audio frame sent to the STT service
    #[serde(default = "default_buffer_duration_ms")]
    pub buffer_duration_ms: u64,
    /// How long to wait for trailing transcripts after a file source is exhausted
    #[serde(default = "default_drain_timeout_ms")]
    pub drain_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NatsConfig {
    pub url: String,
    #[serde(default = "default_transcript_subject")]
    pub transcript_subject: String,
    #[serde(default = "default_broadcast_prefix")]
    pub broadcast_prefix: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub upload_dir: String,
    pub transcript_dir: String,
    /// Largest accepted upload, in megabytes
    #[serde(default = "default_max_upload_mb")]
    pub max_upload_mb: usize,
}

impl StorageConfig {
    pub fn upload_path(&self) -> PathBuf {
        expand(&self.upload_dir)
    }

    pub fn transcript_path(&self) -> PathBuf {
        expand(&self.transcript_dir)
    }
}

fn expand(dir: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(dir).into_owned())
}

fn default_language() -> String {
    "en-US".to_string()
}

fn default_sample_rate() -> u32 {
    16000
}

fn default_channels() -> u16 {
    1
}

fn default_buffer_duration_ms() -> u64 {
    100
}

fn default_drain_timeout_ms() -> u64 {
    5000
}

fn default_max_upload_mb() -> usize {
    200
}

fn default_transcript_subject() -> String {
    "stt.text.>".to_string()
}

fn default_broadcast_prefix() -> String {
    "transcript.user".to_string()
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
