use anyhow::Result;
use tokio::sync::{mpsc, watch};

use super::events::RecognitionEvent;
use crate::audio::AudioSource;

/// Control side of a running recognition stream
#[async_trait::async_trait]
pub trait StreamHandle: Send {
    /// Stop the stream and release its audio source.
    ///
    /// Safe to call more than once.
    async fn stop(&mut self) -> Result<()>;
}

/// A started recognition stream: ordered events plus the handle to end it
pub struct RecognitionStream {
    pub events: mpsc::Receiver<RecognitionEvent>,
    pub handle: Box<dyn StreamHandle>,
}

/// Streaming speech recognition service
///
/// `start_streaming` returns once the stream is active; events then arrive on
/// the stream's receiver until an `Ended` event or until the handle is stopped.
#[async_trait::async_trait]
pub trait RecognitionEngine: Send + Sync {
    async fn start_streaming(
        &self,
        source: &AudioSource,
        language: &str,
    ) -> Result<RecognitionStream>;

    /// Engine name for logging
    fn name(&self) -> &str;
}

/// Send `event` unless `stop` fires first.
///
/// Returns false when the event was not delivered, either because the stream
/// is stopping or because the receiver is gone. Never waits on a full channel
/// once a stop has been requested.
pub async fn send_unless_stopped(
    events: &mpsc::Sender<RecognitionEvent>,
    stop: &mut watch::Receiver<bool>,
    event: RecognitionEvent,
) -> bool {
    if *stop.borrow() {
        return false;
    }

    tokio::select! {
        biased;

        _ = stop.changed() => false,
        sent = events.send(event) => sent.is_ok(),
    }
}
