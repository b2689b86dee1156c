//! Upload normalization: any container/codec symphonia can read becomes a
//! 16-bit mono WAV at the recognition sample rate.

use std::fs::File;
use std::path::{Path, PathBuf};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, info};

use super::resample::{resample, to_i16};
use crate::error::{Result, TranscriptionError};

/// Stateless audio format converter
pub trait AudioConverter: Send + Sync {
    /// Convert `input` into the engine format and return the new file's path.
    fn convert(&self, input: &Path) -> Result<PathBuf>;
}

/// Whether a file already carries the engine's container, judged by extension
pub fn is_wav(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("wav"))
        .unwrap_or(false)
}

/// Whether `path` must go through a converter before recognition.
///
/// Only a readable 16-bit integer mono WAV at `sample_rate` can be streamed as
/// is; anything else, including a WAV with another layout, is converted.
pub fn needs_conversion(path: &Path, sample_rate: u32) -> bool {
    if !is_wav(path) {
        return true;
    }

    match hound::WavReader::open(path) {
        Ok(reader) => {
            let spec = reader.spec();
            let ready = spec.sample_format == hound::SampleFormat::Int
                && spec.bits_per_sample == 16
                && spec.channels == 1
                && spec.sample_rate == sample_rate;
            if !ready {
                debug!(
                    "{} is {}Hz x{} {}-bit {:?}, converting",
                    path.display(),
                    spec.sample_rate,
                    spec.channels,
                    spec.bits_per_sample,
                    spec.sample_format
                );
            }
            !ready
        }
        Err(e) => {
            debug!("{} has no readable WAV header ({}), converting", path.display(), e);
            true
        }
    }
}

/// Converts uploads to 16-bit PCM mono WAV
#[derive(Debug, Clone)]
pub struct WavConverter {
    pub target_sample_rate: u32,
}

impl Default for WavConverter {
    fn default() -> Self {
        Self {
            target_sample_rate: 16000,
        }
    }
}

impl WavConverter {
    pub fn new(target_sample_rate: u32) -> Self {
        Self { target_sample_rate }
    }

    /// `<stem>.wav` next to the input; never the input itself
    fn output_path(input: &Path) -> PathBuf {
        let candidate = input.with_extension("wav");
        if candidate == input {
            input.with_extension("converted.wav")
        } else {
            candidate
        }
    }

    fn decode(&self, input: &Path) -> Result<(Vec<f32>, u32, usize)> {
        let file = File::open(input)
            .map_err(|e| conversion(format!("failed to open {}: {}", input.display(), e)))?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = input.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| conversion(format!("unsupported format: {}", e)))?;

        let mut format = probed.format;
        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| conversion("no audio track found"))?;

        let track_id = track.id;
        let sample_rate = track
            .codec_params
            .sample_rate
            .ok_or_else(|| conversion("could not determine sample rate"))?;
        let channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(1);

        let mut decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| conversion(format!("failed to create decoder: {}", e)))?;

        let mut samples = Vec::new();
        let mut sample_buf: Option<SampleBuffer<f32>> = None;

        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(SymphoniaError::ResetRequired) => break,
                Err(e) => return Err(conversion(format!("failed to read packet: {}", e))),
            };

            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(e)) => {
                    // Corrupt packet, keep going with the rest of the stream
                    debug!("Skipping undecodable packet: {}", e);
                    continue;
                }
                Err(e) => return Err(conversion(format!("failed to decode: {}", e))),
            };

            let spec = *decoded.spec();
            let needed = decoded.capacity() * spec.channels.count();
            if sample_buf.as_ref().map_or(true, |b| b.capacity() < needed) {
                sample_buf = Some(SampleBuffer::<f32>::new(decoded.capacity() as u64, spec));
            }
            if let Some(buf) = sample_buf.as_mut() {
                buf.copy_interleaved_ref(decoded);
                samples.extend_from_slice(buf.samples());
            }
        }

        if samples.is_empty() {
            return Err(conversion("input contains no audio"));
        }

        Ok((samples, sample_rate, channels.max(1)))
    }
}

impl AudioConverter for WavConverter {
    fn convert(&self, input: &Path) -> Result<PathBuf> {
        info!("Converting {} to WAV", input.display());

        let (samples, sample_rate, channels) = self.decode(input)?;
        let mono = downmix(&samples, channels);
        let resampled = resample(&mono, sample_rate, self.target_sample_rate)
            .map_err(|e| conversion(format!("{:#}", e)))?;

        let output = Self::output_path(input);
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.target_sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut writer = hound::WavWriter::create(&output, spec)
            .map_err(|e| conversion(format!("failed to create {}: {}", output.display(), e)))?;
        for sample in resampled {
            writer
                .write_sample(to_i16(sample))
                .map_err(|e| conversion(format!("failed to write sample: {}", e)))?;
        }
        writer
            .finalize()
            .map_err(|e| conversion(format!("failed to finalize WAV: {}", e)))?;

        info!(
            "Converted {} ({} Hz, {} ch) -> {}",
            input.display(),
            sample_rate,
            channels,
            output.display()
        );

        Ok(output)
    }
}

fn conversion(reason: impl Into<String>) -> TranscriptionError {
    TranscriptionError::Conversion(reason.into())
}

/// Average interleaved channels into one
pub fn downmix(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    samples
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}
