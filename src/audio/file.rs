use anyhow::{Context, Result};
use hound::WavReader;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::backend::{AudioBackend, AudioBackendConfig, AudioFrame};
use super::resample::resample_interleaved;

/// A fully decoded 16-bit PCM WAV file
pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    /// Interleaved samples
    pub samples: Vec<i16>,
}

impl AudioFile {
    /// Read a whole WAV file into memory. Only 16-bit integer PCM is accepted.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Reading WAV source {}", path.display());

        let reader = WavReader::open(path)
            .with_context(|| format!("Failed to open WAV file {}", path.display()))?;

        let spec = reader.spec();
        if spec.bits_per_sample != 16 || spec.sample_format != hound::SampleFormat::Int {
            anyhow::bail!(
                "Expected 16-bit PCM WAV, got {}-bit {:?}",
                spec.bits_per_sample,
                spec.sample_format
            );
        }

        let samples = reader
            .into_samples::<i16>()
            .collect::<Result<Vec<i16>, _>>()
            .with_context(|| format!("Corrupt sample data in {}", path.display()))?;

        let frames = samples.len() / spec.channels.max(1) as usize;
        let duration_seconds = frames as f64 / spec.sample_rate as f64;

        info!(
            "WAV source {}: {:.1}s at {}Hz x{}",
            path.display(),
            duration_seconds,
            spec.sample_rate,
            spec.channels
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }

    /// Samples in the requested layout.
    ///
    /// Multi-channel input is averaged down when mono is requested, and the
    /// sample rate is converted in either direction.
    pub fn conform(&self, target_sample_rate: u32, target_channels: u16) -> Result<Vec<i16>> {
        let channels = self.channels.max(1);

        let (samples, channels) = if channels == target_channels {
            (self.samples.clone(), channels)
        } else if target_channels == 1 {
            let mono = self
                .samples
                .chunks_exact(channels as usize)
                .map(|frame| {
                    let sum: i32 = frame.iter().map(|&s| s as i32).sum();
                    (sum / frame.len() as i32) as i16
                })
                .collect();
            (mono, 1)
        } else {
            anyhow::bail!(
                "Cannot map {} channel(s) in {} to {}",
                channels,
                self.path,
                target_channels
            );
        };

        if self.sample_rate == target_sample_rate {
            return Ok(samples);
        }

        debug!(
            "Resampling {} from {}Hz to {}Hz",
            self.path, self.sample_rate, target_sample_rate
        );
        resample_interleaved(&samples, channels, self.sample_rate, target_sample_rate)
    }
}

/// Streams a prepared WAV file as fixed-size frames
pub struct FileBackend {
    path: PathBuf,
    config: AudioBackendConfig,
    capturing: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl FileBackend {
    pub fn new(path: PathBuf, config: AudioBackendConfig) -> Self {
        Self {
            path,
            config,
            capturing: Arc::new(AtomicBool::new(false)),
            task: None,
        }
    }
}

#[async_trait::async_trait]
impl AudioBackend for FileBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        let path = self.path.clone();
        let sample_rate = self.config.target_sample_rate;
        let channels = self.config.target_channels;

        let samples = tokio::task::spawn_blocking(move || {
            AudioFile::open(path)?.conform(sample_rate, channels)
        })
        .await
        .context("Audio file reader panicked")??;
        let frame_len = self.config.samples_per_frame();
        let frame_ms = self.config.buffer_duration_ms;

        let (tx, rx) = mpsc::channel(100);
        self.capturing.store(true, Ordering::SeqCst);
        let capturing = Arc::clone(&self.capturing);

        self.task = Some(tokio::spawn(async move {
            for (index, chunk) in samples.chunks(frame_len).enumerate() {
                if !capturing.load(Ordering::SeqCst) {
                    break;
                }

                let frame = AudioFrame {
                    samples: chunk.to_vec(),
                    sample_rate,
                    channels,
                    timestamp_ms: index as u64 * frame_ms,
                };

                if tx.send(frame).await.is_err() {
                    warn!("Audio frame receiver dropped");
                    break;
                }
            }

            capturing.store(false, Ordering::SeqCst);
            info!("File source exhausted");
        }));

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        self.capturing.store(false, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            task.abort();
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "file"
    }
}
