// Shared test doubles for the recognition engine, broadcaster and converter.

#![allow(dead_code)]

use anyhow::Result;
use live_transcription::audio::AudioConverter;
use live_transcription::{
    AudioSource, BroadcastPublisher, RecognitionEngine, RecognitionEvent, RecognitionStream,
    SessionConfig, SessionRegistry, StreamHandle, TranscriptionError,
};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Test-side view of one stream started by `ScriptedEngine`
#[derive(Clone)]
pub struct StreamControl {
    pub source: AudioSource,
    pub language: String,
    pub events: mpsc::Sender<RecognitionEvent>,
    pub stopped: Arc<AtomicBool>,
}

impl StreamControl {
    pub async fn say(&self, speaker: &str, text: &str) {
        self.events
            .send(RecognitionEvent::Recognized {
                speaker_id: speaker.to_string(),
                text: text.to_string(),
            })
            .await
            .expect("session loop dropped its event receiver");
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// Engine whose events are injected by the test
#[derive(Default)]
pub struct ScriptedEngine {
    streams: Mutex<Vec<StreamControl>>,
    fail_next: AtomicBool,
}

impl ScriptedEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn started(&self) -> usize {
        self.streams.lock().unwrap().len()
    }

    pub fn stream(&self, index: usize) -> StreamControl {
        self.streams.lock().unwrap()[index].clone()
    }

    pub fn last_stream(&self) -> StreamControl {
        self.streams.lock().unwrap().last().cloned().expect("no stream started")
    }

    pub fn fail_next_start(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

struct ScriptedHandle {
    stopped: Arc<AtomicBool>,
}

#[async_trait::async_trait]
impl StreamHandle for ScriptedHandle {
    async fn stop(&mut self) -> Result<()> {
        self.stopped.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait::async_trait]
impl RecognitionEngine for ScriptedEngine {
    async fn start_streaming(
        &self,
        source: &AudioSource,
        language: &str,
    ) -> Result<RecognitionStream> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            anyhow::bail!("STT service unavailable");
        }

        let (tx, rx) = mpsc::channel(100);
        let stopped = Arc::new(AtomicBool::new(false));

        self.streams.lock().unwrap().push(StreamControl {
            source: source.clone(),
            language: language.to_string(),
            events: tx,
            stopped: Arc::clone(&stopped),
        });

        Ok(RecognitionStream {
            events: rx,
            handle: Box::new(ScriptedHandle { stopped }),
        })
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Broadcaster that records every message, optionally failing each publish
#[derive(Default)]
pub struct RecordingPublisher {
    messages: Mutex<Vec<(String, String)>>,
    failing: AtomicBool,
}

impl RecordingPublisher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        let publisher = Self::default();
        publisher.failing.store(true, Ordering::SeqCst);
        Arc::new(publisher)
    }

    pub fn messages_for(&self, user_id: &str) -> Vec<String> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter(|(user, _)| user == user_id)
            .map(|(_, text)| text.clone())
            .collect()
    }
}

#[async_trait::async_trait]
impl BroadcastPublisher for RecordingPublisher {
    async fn publish(&self, user_id: &str, text: &str) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("pub/sub unavailable");
        }
        self.messages
            .lock()
            .unwrap()
            .push((user_id.to_string(), text.to_string()));
        Ok(())
    }
}

/// Converter that copies its input to `<stem>.wav` (or `<stem>.converted.wav`
/// for WAV input) and counts calls
#[derive(Default)]
pub struct CopyConverter {
    pub calls: AtomicUsize,
}

impl AudioConverter for CopyConverter {
    fn convert(&self, input: &Path) -> Result<PathBuf, TranscriptionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut output = input.with_extension("wav");
        if output == input {
            output = input.with_extension("converted.wav");
        }
        std::fs::copy(input, &output).map_err(|e| TranscriptionError::Conversion(e.to_string()))?;
        Ok(output)
    }
}

pub fn registry(
    engine: &Arc<ScriptedEngine>,
    publisher: &Arc<RecordingPublisher>,
) -> SessionRegistry {
    SessionRegistry::new(engine.clone(), publisher.clone(), SessionConfig::default())
}

/// Poll `check` until it holds or two seconds pass
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

/// Write a short 16-bit WAV file
pub fn write_wav(path: &Path, sample_rate: u32, channels: u16, seconds: f32) {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    let frames = (sample_rate as f32 * seconds) as usize;
    for i in 0..frames {
        let t = i as f32 / sample_rate as f32;
        let value = ((t * 440.0 * 2.0 * std::f32::consts::PI).sin() * 8000.0) as i16;
        for _ in 0..channels {
            writer.write_sample(value).unwrap();
        }
    }
    writer.finalize().unwrap();
}

/// Bytes of a short 16-bit WAV file, for uploads
pub fn wav_bytes(sample_rate: u32, channels: u16, seconds: f32) -> Vec<u8> {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("clip.wav");
    write_wav(&path, sample_rate, channels, seconds);
    std::fs::read(&path).unwrap()
}
