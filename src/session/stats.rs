use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::state::SessionState;

/// Point-in-time view of one user's session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    pub user_id: String,

    pub state: SessionState,

    /// When recognition started
    pub started_at: DateTime<Utc>,

    /// Seconds since `started_at`
    pub duration_secs: f64,

    /// Most recent recognized utterance, if any
    pub last_activity_at: Option<DateTime<Utc>>,

    /// Lines in the transcript so far
    pub transcript_lines: usize,

    /// Whether the session owns a temporary audio file
    pub from_file: bool,
}
