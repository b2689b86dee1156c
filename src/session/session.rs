use super::config::SessionConfig;
use super::state::{SessionState, StateCell};
use super::stats::SessionStats;
use super::transcript::{format_line, TranscriptAccumulator};
use crate::broadcast::BroadcastPublisher;
use crate::error::TranscriptionError;
use crate::recognition::{EndReason, RecognitionEvent, RecognitionStream};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Called from the loop task when the engine ended the stream on its own
pub type EndedCallback = Box<dyn FnOnce(EndReason) + Send + 'static>;

/// State the recognition loop and the registry both touch
struct SessionCore {
    user_id: String,
    state: StateCell,
    started: Instant,
    transcript: TranscriptAccumulator,
    last_activity_at: Mutex<Option<DateTime<Utc>>>,
}

impl SessionCore {
    /// Recognized-speech handler: append, then queue for broadcast
    fn on_recognized(&self, speaker_id: &str, text: &str, lines: &mpsc::Sender<String>) {
        let line = format_line(self.started.elapsed(), speaker_id, text);
        self.transcript.append(&line);
        *self.last_activity_at.lock().unwrap_or_else(|e| e.into_inner()) = Some(Utc::now());

        debug!("{} <- {}", self.user_id, line.trim_end());

        match lines.try_send(line) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Broadcast queue full for {}, dropping live update", self.user_id)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!("Broadcast forwarder for {} is gone", self.user_id)
            }
        }
    }

    fn on_no_match(&self, details: &str) {
        info!("NOMATCH for {}: speech could not be transcribed: {}", self.user_id, details);
    }

    fn on_ended(&self, reason: &EndReason) {
        match reason {
            EndReason::Stopped => info!("Recognition for {} stopped by engine", self.user_id),
            EndReason::EndOfInput => info!("Recognition for {} reached end of input", self.user_id),
            EndReason::Error(details) => error!(
                "{}",
                TranscriptionError::RecognitionStream(format!("{}: {}", self.user_id, details))
            ),
        }
    }
}

enum LoopExit {
    Cancelled,
    Ended(EndReason),
}

/// One user's active transcription run
pub struct Session {
    id: Uuid,
    core: Arc<SessionCore>,
    started_at: DateTime<Utc>,
    cancel: watch::Sender<bool>,
    source_file: Mutex<Option<PathBuf>>,
    task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    /// Create a session for a stream the engine has confirmed active.
    ///
    /// The session is `Running` from here on; call [`Session::spawn`] to start
    /// consuming events.
    pub fn new(user_id: impl Into<String>, source_file: Option<PathBuf>) -> Self {
        let core = SessionCore {
            user_id: user_id.into(),
            state: StateCell::new(),
            started: Instant::now(),
            transcript: TranscriptAccumulator::new(),
            last_activity_at: Mutex::new(None),
        };
        core.state.advance(SessionState::Running);

        let (cancel, _) = watch::channel(false);

        Self {
            id: Uuid::new_v4(),
            core: Arc::new(core),
            started_at: Utc::now(),
            cancel,
            source_file: Mutex::new(source_file),
            task: tokio::sync::Mutex::new(None),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn user_id(&self) -> &str {
        &self.core.user_id
    }

    pub fn state(&self) -> SessionState {
        self.core.state.current()
    }

    pub fn transcript(&self) -> String {
        self.core.transcript.snapshot()
    }

    pub fn source_file(&self) -> Option<PathBuf> {
        self.source_file.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn stats(&self) -> SessionStats {
        let duration = Utc::now().signed_duration_since(self.started_at);

        SessionStats {
            user_id: self.core.user_id.clone(),
            state: self.state(),
            started_at: self.started_at,
            duration_secs: duration.num_milliseconds() as f64 / 1000.0,
            last_activity_at: *self
                .core
                .last_activity_at
                .lock()
                .unwrap_or_else(|e| e.into_inner()),
            transcript_lines: self.core.transcript.line_count(),
            from_file: self.source_file().is_some(),
        }
    }

    /// Launch the recognition loop as its own task.
    ///
    /// `on_ended` runs only when the engine ends the stream; a cancelled loop
    /// leaves teardown to whoever cancelled it.
    pub async fn spawn(
        &self,
        mut stream: RecognitionStream,
        publisher: Arc<dyn BroadcastPublisher>,
        config: &SessionConfig,
        on_ended: EndedCallback,
    ) {
        let mut task = self.task.lock().await;

        if *self.cancel.borrow() {
            // Shut down before the loop ever ran
            if let Err(e) = stream.handle.stop().await {
                error!("Failed to stop recognition stream: {}", e);
            }
            return;
        }

        let core = Arc::clone(&self.core);
        let cancel = self.cancel.subscribe();
        let queue = config.broadcast_queue.max(1);

        *task = Some(tokio::spawn(async move {
            let exit = run(Arc::clone(&core), stream, cancel, publisher, queue).await;
            if let LoopExit::Ended(reason) = exit {
                core.on_ended(&reason);
                on_ended(reason);
            }
        }));

        info!("Recognition loop launched for {}", self.core.user_id);
    }

    /// Cancel the loop, wait for it to exit, and release the session's resources.
    ///
    /// Returns the transcript as it stood once the loop had fully stopped; the
    /// buffer is emptied in the same critical section.
    pub async fn shutdown(&self) -> String {
        self.core.state.advance(SessionState::Stopping);
        self.cancel.send_replace(true);

        let handle = self.task.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("Recognition loop for {} panicked: {}", self.core.user_id, e);
            }
        }

        let transcript = self.core.transcript.take();
        self.remove_source_file().await;
        self.core.state.advance(SessionState::Stopped);

        transcript
    }

    async fn remove_source_file(&self) {
        let path = self.source_file.lock().unwrap_or_else(|e| e.into_inner()).take();
        let Some(path) = path else {
            return;
        };

        match tokio::fs::remove_file(&path).await {
            Ok(()) => info!("Removed temporary audio file {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Temporary audio file {} already gone", path.display())
            }
            Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
        }
    }
}

async fn run(
    core: Arc<SessionCore>,
    mut stream: RecognitionStream,
    mut cancel: watch::Receiver<bool>,
    publisher: Arc<dyn BroadcastPublisher>,
    queue: usize,
) -> LoopExit {
    let (line_tx, line_rx) = mpsc::channel(queue);
    let forwarder = tokio::spawn(forward_lines(core.user_id.clone(), publisher, line_rx));

    let exit = loop {
        if *cancel.borrow() {
            break LoopExit::Cancelled;
        }

        tokio::select! {
            biased;

            _ = cancel.changed() => break LoopExit::Cancelled,
            event = stream.events.recv() => match event {
                Some(RecognitionEvent::Recognized { speaker_id, text }) => {
                    core.on_recognized(&speaker_id, &text, &line_tx);
                }
                Some(RecognitionEvent::NoMatch { details }) => core.on_no_match(&details),
                Some(RecognitionEvent::Ended(reason)) => break LoopExit::Ended(reason),
                None => {
                    break LoopExit::Ended(EndReason::Error("event stream closed".to_string()))
                }
            },
        }
    };

    core.state.advance(SessionState::Stopping);

    if let Err(e) = stream.handle.stop().await {
        error!("Failed to stop recognition stream for {}: {}", core.user_id, e);
    }

    // Results the engine emitted before it stopped still belong to this session
    while let Ok(event) = stream.events.try_recv() {
        match event {
            RecognitionEvent::Recognized { speaker_id, text } => {
                core.on_recognized(&speaker_id, &text, &line_tx)
            }
            RecognitionEvent::NoMatch { details } => core.on_no_match(&details),
            RecognitionEvent::Ended(_) => break,
        }
    }

    // Flush queued lines so broadcasts precede the stop marker
    drop(line_tx);
    if let Err(e) = forwarder.await {
        error!("Broadcast forwarder for {} panicked: {}", core.user_id, e);
    }

    exit
}

async fn forward_lines(
    user_id: String,
    publisher: Arc<dyn BroadcastPublisher>,
    mut lines: mpsc::Receiver<String>,
) {
    while let Some(line) = lines.recv().await {
        if let Err(e) = publisher.publish(&user_id, &line).await {
            warn!("{}", TranscriptionError::Publish(format!("{}: {:#}", user_id, e)));
        }
    }
}
