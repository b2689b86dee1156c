use serde::{Deserialize, Serialize};

use crate::broadcast::STOPPED_MESSAGE;

/// Settings shared by every session the registry creates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Recognition language (e.g., "en-US")
    pub language: String,

    /// Final marker published to a user's channel after teardown
    pub stopped_message: String,

    /// Capacity of the per-session broadcast queue
    pub broadcast_queue: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            language: "en-US".to_string(),
            stopped_message: STOPPED_MESSAGE.to_string(),
            broadcast_queue: 256,
        }
    }
}
