use serde::{Deserialize, Serialize};

/// Audio frame message published to NATS for the STT service
#[derive(Debug, Serialize, Deserialize)]
pub struct AudioFrameMessage {
    /// Recognition stream this frame belongs to
    pub session_id: String,
    pub sequence: u32,
    pub pcm: String,  // Base64-encoded PCM bytes
    pub sample_rate: u32,
    pub channels: u16,
    /// BCP-47 recognition language, e.g. "en-US"
    pub language: String,
    pub timestamp: String,  // RFC3339 timestamp
    #[serde(rename = "final")]
    pub final_frame: bool,
}

/// Transcript message received from STT service
#[derive(Debug, Serialize, Deserialize)]
pub struct TranscriptMessage {
    pub session_id: String,
    pub text: String,
    pub partial: bool,
    pub timestamp: String,
    #[serde(default)]
    pub confidence: Option<f32>,
    /// Diarization label, when the STT service provides one
    #[serde(default)]
    pub speaker_id: Option<String>,
    /// Set on the last message of a stream
    #[serde(default)]
    pub end_of_stream: bool,
}
