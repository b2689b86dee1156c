//! Recognition over NATS: audio frames out on `audio.frame.<stream>`,
//! transcripts back on the STT service's subject tree.

use anyhow::{Context, Result};
use futures::stream::StreamExt;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::engine::{send_unless_stopped, RecognitionEngine, RecognitionStream, StreamHandle};
use super::events::{EndReason, RecognitionEvent};
use crate::audio::{AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioFrame, AudioSource};
use crate::nats::{NatsClient, TranscriptMessage};

const UNKNOWN_SPEAKER: &str = "Unknown";

pub struct NatsRecognitionEngine {
    client: NatsClient,
    audio: AudioBackendConfig,
    transcript_subject: String,
    drain_timeout: Duration,
}

impl NatsRecognitionEngine {
    pub fn new(
        client: NatsClient,
        audio: AudioBackendConfig,
        transcript_subject: impl Into<String>,
        drain_timeout: Duration,
    ) -> Self {
        Self {
            client,
            audio,
            transcript_subject: transcript_subject.into(),
            drain_timeout,
        }
    }
}

#[async_trait::async_trait]
impl RecognitionEngine for NatsRecognitionEngine {
    async fn start_streaming(
        &self,
        source: &AudioSource,
        language: &str,
    ) -> Result<RecognitionStream> {
        let stream_id = format!("stream-{}", uuid::Uuid::new_v4());
        info!("Starting recognition stream {} ({:?}, {})", stream_id, source, language);

        // Subscribe before the first frame goes out so no result is missed
        let subscriber = self
            .client
            .subscribe_transcripts(&self.transcript_subject)
            .await?;

        let mut backend = AudioBackendFactory::create(source, self.audio.clone())
            .context("Failed to create audio backend")?;
        let frames = backend
            .start()
            .await
            .with_context(|| format!("Failed to start {} capture", backend.name()))?;

        let (event_tx, event_rx) = mpsc::channel(100);
        let (stop_tx, stop_rx) = watch::channel(false);

        let pump = tokio::spawn(pump_audio(AudioPump {
            client: self.client.clone(),
            backend,
            stream_id: stream_id.clone(),
            language: language.to_string(),
            from_file: matches!(source, AudioSource::File(_)),
            drain_timeout: self.drain_timeout,
            events: event_tx.clone(),
            stop: stop_rx,
        }, frames));

        let listener = tokio::spawn(forward_transcripts(subscriber, stream_id.clone(), event_tx));

        Ok(RecognitionStream {
            events: event_rx,
            handle: Box::new(NatsStreamHandle {
                stream_id,
                stop_tx,
                pump: Some(pump),
                listener: Some(listener),
            }),
        })
    }

    fn name(&self) -> &str {
        "nats"
    }
}

/// Map an STT result for this stream onto a recognition event.
///
/// Partial results are not surfaced; only final utterances reach the transcript.
pub fn transcript_event(msg: &TranscriptMessage) -> Option<RecognitionEvent> {
    if msg.partial {
        return None;
    }

    let text = msg.text.trim();
    if text.is_empty() {
        return Some(RecognitionEvent::NoMatch {
            details: "empty final result".to_string(),
        });
    }

    Some(RecognitionEvent::Recognized {
        speaker_id: msg
            .speaker_id
            .clone()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| UNKNOWN_SPEAKER.to_string()),
        text: text.to_string(),
    })
}

struct AudioPump {
    client: NatsClient,
    backend: Box<dyn AudioBackend>,
    stream_id: String,
    language: String,
    from_file: bool,
    drain_timeout: Duration,
    events: mpsc::Sender<RecognitionEvent>,
    stop: watch::Receiver<bool>,
}

async fn pump_audio(mut pump: AudioPump, mut frames: mpsc::Receiver<AudioFrame>) {
    debug!("Audio pump started for {}", pump.stream_id);

    let mut sequence: u32 = 0;
    let mut last_format = (0u32, 0u16);

    let exhausted = loop {
        if *pump.stop.borrow() {
            break false;
        }

        tokio::select! {
            _ = pump.stop.changed() => break false,
            frame = frames.recv() => match frame {
                Some(frame) => {
                    let pcm_bytes: Vec<u8> = frame
                        .samples
                        .iter()
                        .flat_map(|s| s.to_le_bytes())
                        .collect();
                    last_format = (frame.sample_rate, frame.channels);

                    if let Err(e) = pump
                        .client
                        .publish_audio_frame(
                            &pump.stream_id,
                            &pump.language,
                            &pcm_bytes,
                            frame.sample_rate,
                            frame.channels,
                            sequence,
                            false,
                        )
                        .await
                    {
                        error!("Failed to publish audio frame: {}", e);
                    }
                    sequence = sequence.wrapping_add(1);
                }
                None => break true,
            },
        }
    };

    // Final frame marker tells the STT service to flush
    if let Err(e) = pump
        .client
        .publish_audio_frame(
            &pump.stream_id,
            &pump.language,
            &[],
            last_format.0,
            last_format.1,
            sequence,
            true,
        )
        .await
    {
        error!("Failed to send final frame: {}", e);
    }

    if let Err(e) = pump.backend.stop().await {
        error!("Failed to stop audio backend: {}", e);
    }

    if !exhausted {
        debug!("Audio pump for {} stopped on request", pump.stream_id);
        return;
    }

    if pump.from_file {
        info!(
            "Audio source for {} exhausted after {} frames, draining results",
            pump.stream_id, sequence
        );
        tokio::select! {
            _ = tokio::time::sleep(pump.drain_timeout) => {
                send_unless_stopped(
                    &pump.events,
                    &mut pump.stop,
                    RecognitionEvent::Ended(EndReason::EndOfInput),
                )
                .await;
            }
            _ = pump.stop.changed() => {}
        }
    } else {
        warn!("Capture device for {} stopped delivering audio", pump.stream_id);
        send_unless_stopped(
            &pump.events,
            &mut pump.stop,
            RecognitionEvent::Ended(EndReason::Error(
                "audio capture device stopped".to_string(),
            )),
        )
        .await;
    }
}

async fn forward_transcripts(
    mut subscriber: async_nats::Subscriber,
    stream_id: String,
    events: mpsc::Sender<RecognitionEvent>,
) {
    while let Some(msg) = subscriber.next().await {
        let transcript = match serde_json::from_slice::<TranscriptMessage>(&msg.payload) {
            Ok(transcript) => transcript,
            Err(e) => {
                warn!("Failed to parse transcript message: {}", e);
                continue;
            }
        };

        if transcript.session_id != stream_id {
            continue;
        }

        if transcript.partial {
            debug!("Partial result for {}: {}", stream_id, transcript.text);
        }

        if let Some(event) = transcript_event(&transcript) {
            if events.send(event).await.is_err() {
                return;
            }
        }

        if transcript.end_of_stream {
            let _ = events.send(RecognitionEvent::Ended(EndReason::EndOfInput)).await;
            return;
        }
    }

    let _ = events
        .send(RecognitionEvent::Ended(EndReason::Error(
            "transcript subscription closed".to_string(),
        )))
        .await;
}

struct NatsStreamHandle {
    stream_id: String,
    stop_tx: watch::Sender<bool>,
    pump: Option<JoinHandle<()>>,
    listener: Option<JoinHandle<()>>,
}

#[async_trait::async_trait]
impl StreamHandle for NatsStreamHandle {
    async fn stop(&mut self) -> Result<()> {
        let _ = self.stop_tx.send(true);

        if let Some(pump) = self.pump.take() {
            if let Err(e) = pump.await {
                error!("Audio pump for {} panicked: {}", self.stream_id, e);
            }
        }

        if let Some(listener) = self.listener.take() {
            listener.abort();
            let _ = listener.await;
        }

        info!("Recognition stream {} stopped", self.stream_id);
        Ok(())
    }
}
