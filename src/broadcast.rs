//! Per-user push channel for incremental transcript lines

use anyhow::Result;
use tracing::debug;

use crate::nats::{subject_token, NatsClient};

/// Marker sent to a user's channel once their session has been torn down
pub const STOPPED_MESSAGE: &str = "Transcription stopped.";

/// Delivers a text message to every listener of one user.
///
/// Delivery is best effort; callers log failures and carry on.
#[async_trait::async_trait]
pub trait BroadcastPublisher: Send + Sync {
    async fn publish(&self, user_id: &str, text: &str) -> Result<()>;
}

/// Publishes plain-text lines on `<prefix>.<user>`
pub struct NatsBroadcaster {
    client: NatsClient,
    prefix: String,
}

impl NatsBroadcaster {
    pub fn new(client: NatsClient, prefix: impl Into<String>) -> Self {
        Self {
            client,
            prefix: prefix.into(),
        }
    }

    pub fn subject_for(&self, user_id: &str) -> String {
        format!("{}.{}", self.prefix, subject_token(user_id))
    }
}

#[async_trait::async_trait]
impl BroadcastPublisher for NatsBroadcaster {
    async fn publish(&self, user_id: &str, text: &str) -> Result<()> {
        let subject = self.subject_for(user_id);
        debug!("Broadcasting {} bytes to {}", text.len(), subject);
        self.client.publish_text(subject, text).await
    }
}
