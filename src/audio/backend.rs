use anyhow::Result;
use std::path::PathBuf;
use tokio::sync::mpsc;

/// One buffer of captured audio
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// 16-bit PCM, channels interleaved
    pub samples: Vec<i16>,
    pub sample_rate: u32,
    pub channels: u16,
    /// Offset from the start of the source, in ms
    pub timestamp_ms: u64,
}

/// Where recognizable audio comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioSource {
    /// Default capture device of the host
    Microphone,
    /// A prepared WAV file (already converted to the engine format)
    File(PathBuf),
}

impl AudioSource {
    /// Path of the backing file, if any
    pub fn file_path(&self) -> Option<&PathBuf> {
        match self {
            AudioSource::Microphone => None,
            AudioSource::File(path) => Some(path),
        }
    }
}

/// Frame layout requested from a backend
#[derive(Debug, Clone)]
pub struct AudioBackendConfig {
    /// Sample rate delivered to the STT service
    pub target_sample_rate: u32,
    /// 1 = mono, 2 = stereo
    pub target_channels: u16,
    /// Length of one frame in ms
    pub buffer_duration_ms: u64,
}

impl Default for AudioBackendConfig {
    fn default() -> Self {
        Self {
            target_sample_rate: 16000, // 16kHz for the STT service
            target_channels: 1,        // Mono
            buffer_duration_ms: 100,   // 100ms buffers
        }
    }
}

impl AudioBackendConfig {
    /// Number of interleaved samples in one frame
    pub fn samples_per_frame(&self) -> usize {
        let per_channel = self.target_sample_rate as u64 * self.buffer_duration_ms / 1000;
        (per_channel.max(1) * self.target_channels.max(1) as u64) as usize
    }
}

/// Regroups capture buffers of whatever size the device delivers into
/// frames of exactly `samples_per_frame` samples
#[derive(Debug)]
pub struct FrameAssembler {
    sample_rate: u32,
    channels: u16,
    frame_len: usize,
    pending: Vec<i16>,
    samples_emitted: u64,
}

impl FrameAssembler {
    pub fn new(config: &AudioBackendConfig) -> Self {
        let frame_len = config.samples_per_frame();
        Self {
            sample_rate: config.target_sample_rate,
            channels: config.target_channels,
            frame_len,
            pending: Vec::with_capacity(frame_len * 2),
            samples_emitted: 0,
        }
    }

    /// Buffer `data` and return every frame it completes
    pub fn push(&mut self, data: &[i16]) -> Vec<AudioFrame> {
        self.pending.extend_from_slice(data);

        let mut frames = Vec::with_capacity(self.pending.len() / self.frame_len);
        while self.pending.len() >= self.frame_len {
            let samples: Vec<i16> = self.pending.drain(..self.frame_len).collect();
            let per_second = self.sample_rate.max(1) as u64 * self.channels.max(1) as u64;

            frames.push(AudioFrame {
                samples,
                sample_rate: self.sample_rate,
                channels: self.channels,
                timestamp_ms: self.samples_emitted * 1000 / per_second,
            });
            self.samples_emitted += self.frame_len as u64;
        }
        frames
    }

    /// Samples waiting for the next frame
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

/// Source of audio frames for a recognition stream
///
/// Implementations:
/// - File: read a prepared WAV file
/// - Microphone: cpal default input device (`microphone` feature)
///
/// The frame channel closes when the source is exhausted or the backend is stopped.
#[async_trait::async_trait]
pub trait AudioBackend: Send + Sync {
    /// Begin delivering frames on the returned channel
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>>;

    async fn stop(&mut self) -> Result<()>;

    fn is_capturing(&self) -> bool;

    /// Short label used in logs
    fn name(&self) -> &str;
}

/// Picks the backend for an `AudioSource`
pub struct AudioBackendFactory;

impl AudioBackendFactory {
    pub fn create(
        source: &AudioSource,
        config: AudioBackendConfig,
    ) -> Result<Box<dyn AudioBackend>> {
        match source {
            AudioSource::File(path) => {
                let backend = super::file::FileBackend::new(path.clone(), config);
                Ok(Box::new(backend))
            }

            AudioSource::Microphone => {
                #[cfg(feature = "microphone")]
                {
                    let backend = super::microphone::MicrophoneBackend::new(config);
                    Ok(Box::new(backend))
                }

                #[cfg(not(feature = "microphone"))]
                {
                    let _ = config;
                    anyhow::bail!("Microphone capture requires the `microphone` feature")
                }
            }
        }
    }
}
