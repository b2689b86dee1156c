use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// Format one transcript line: `[MM:SS] Speaker <id>: <text>\n`.
///
/// Minutes are not capped at 60, so a 75 minute session shows `[75:00]`.
pub fn format_line(elapsed: Duration, speaker_id: &str, text: &str) -> String {
    let total = elapsed.as_secs();
    format!(
        "[{:02}:{:02}] Speaker {}: {}\n",
        total / 60,
        total % 60,
        speaker_id,
        text
    )
}

/// Growing text buffer for one session.
///
/// Every operation is a short in-memory critical section; none of them can fail.
#[derive(Debug, Default)]
pub struct TranscriptAccumulator {
    text: Mutex<String>,
}

impl TranscriptAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the lock cannot leave the String half-written
    fn lock(&self) -> MutexGuard<'_, String> {
        self.text.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn append(&self, line: &str) {
        self.lock().push_str(line);
    }

    pub fn snapshot(&self) -> String {
        self.lock().clone()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Snapshot and clear under a single lock acquisition
    pub fn take(&self) -> String {
        std::mem::take(&mut *self.lock())
    }

    pub fn line_count(&self) -> usize {
        self.lock().lines().count()
    }
}
