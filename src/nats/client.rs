use anyhow::{Context, Result};
use async_nats::Client;
use base64::Engine;
use tracing::{debug, info};

use super::messages::AudioFrameMessage;

/// Shared NATS connection used by the recognition engine and the broadcaster
#[derive(Clone)]
pub struct NatsClient {
    client: Client,
}

impl NatsClient {
    pub async fn connect(url: &str) -> Result<Self> {
        info!("Connecting to NATS at {}", url);

        let client = async_nats::connect(url)
            .await
            .with_context(|| format!("Failed to connect to NATS at {}", url))?;

        info!("NATS connection established");

        Ok(Self { client })
    }

    /// Publish one PCM frame of a recognition stream on `audio.frame.<stream_id>`
    #[allow(clippy::too_many_arguments)]
    pub async fn publish_audio_frame(
        &self,
        stream_id: &str,
        language: &str,
        pcm_bytes: &[u8],
        sample_rate: u32,
        channels: u16,
        sequence: u32,
        is_final: bool,
    ) -> Result<()> {
        let subject = format!("audio.frame.{}", stream_id);

        let message = AudioFrameMessage {
            session_id: stream_id.to_string(),
            sequence,
            pcm: base64::engine::general_purpose::STANDARD.encode(pcm_bytes),
            sample_rate,
            channels,
            language: language.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            final_frame: is_final,
        };

        let payload = serde_json::to_vec(&message)?;

        self.client.publish(subject.clone(), payload.into())
            .await
            .context("Failed to publish audio frame")?;

        debug!(
            "Published audio frame to {} (seq={}, bytes={}, final={})",
            subject, sequence, pcm_bytes.len(), is_final
        );

        Ok(())
    }

    /// Subscribe to transcript messages
    ///
    /// The STT service publishes partial and final results for every stream on
    /// the same subject tree; callers filter by `session_id` in the payload.
    pub async fn subscribe_transcripts(&self, subject: &str) -> Result<async_nats::Subscriber> {
        debug!("Subscribing to transcripts on {}", subject);

        let subscriber = self.client.subscribe(subject.to_string())
            .await
            .context("Failed to subscribe to transcripts")?;

        Ok(subscriber)
    }

    /// Publish a plain-text payload
    pub async fn publish_text(&self, subject: String, text: &str) -> Result<()> {
        self.client
            .publish(subject, text.to_string().into())
            .await
            .context("Failed to publish text message")?;
        Ok(())
    }
}

/// Make an arbitrary identifier usable as a single NATS subject token
pub fn subject_token(id: &str) -> String {
    let token: String = id
        .chars()
        .map(|c| match c {
            '.' | '*' | '>' => '_',
            c if c.is_whitespace() => '_',
            c => c,
        })
        .collect();

    if token.is_empty() {
        "_".to_string()
    } else {
        token
    }
}
