pub mod audio;
pub mod broadcast;
pub mod config;
pub mod error;
pub mod http;
pub mod nats;
pub mod recognition;
pub mod session;

pub use audio::{
    AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioConverter, AudioFile, AudioFrame,
    AudioSource, WavConverter,
};
pub use broadcast::{BroadcastPublisher, NatsBroadcaster, STOPPED_MESSAGE};
pub use config::Config;
pub use error::TranscriptionError;
pub use http::{create_router, ApiSettings, AppState};
pub use nats::{AudioFrameMessage, NatsClient, TranscriptMessage};
pub use recognition::{
    EndReason, NatsRecognitionEngine, RecognitionEngine, RecognitionEvent, RecognitionStream,
    StreamHandle,
};
pub use session::{
    format_line, SessionConfig, SessionRegistry, SessionState, SessionStats,
    TranscriptAccumulator,
};
