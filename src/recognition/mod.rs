//! Adapter seam for the streaming speech recognition service

pub mod engine;
pub mod events;
pub mod nats;

pub use engine::{send_unless_stopped, RecognitionEngine, RecognitionStream, StreamHandle};
pub use events::{EndReason, RecognitionEvent};
pub use nats::{transcript_event, NatsRecognitionEngine};
