//! Sample rate conversion to the recognition rate

use anyhow::{Context, Result};
use rubato::{FftFixedIn, Resampler};

/// Input frames handed to the resampler per call
const CHUNK_FRAMES: usize = 1024;

/// Resample one channel of f32 audio from `from_rate` to `to_rate`.
///
/// The result holds `round(len * to_rate / from_rate)` samples, aligned with
/// the input: the resampler's delay is trimmed from the front and its tail is
/// flushed with silence.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    if from_rate == 0 || to_rate == 0 {
        anyhow::bail!("Sample rate cannot be zero");
    }
    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let mut resampler =
        FftFixedIn::<f32>::new(from_rate as usize, to_rate as usize, CHUNK_FRAMES, 2, 1)
            .with_context(|| format!("Failed to create {}Hz -> {}Hz resampler", from_rate, to_rate))?;

    let expected = (samples.len() as f64 * to_rate as f64 / from_rate as f64).round() as usize;
    let delay = resampler.output_delay();
    let wanted = expected + delay;

    let mut output = Vec::with_capacity(wanted + resampler.output_frames_max());
    let mut position = 0;

    while output.len() < wanted {
        let frames = resampler.input_frames_next();
        let mut chunk = vec![0.0f32; frames];
        if position < samples.len() {
            let end = (position + frames).min(samples.len());
            chunk[..end - position].copy_from_slice(&samples[position..end]);
        }
        position += frames;

        let resampled = resampler
            .process(&[chunk], None)
            .context("Resampling failed")?;
        output.extend_from_slice(&resampled[0]);
    }

    output.truncate(wanted);
    Ok(output.split_off(delay))
}

/// Resample interleaved 16-bit audio, each channel independently
pub fn resample_interleaved(
    samples: &[i16],
    channels: u16,
    from_rate: u32,
    to_rate: u32,
) -> Result<Vec<i16>> {
    let channels = channels.max(1) as usize;

    let planes = (0..channels)
        .map(|channel| {
            let plane: Vec<f32> = samples
                .iter()
                .skip(channel)
                .step_by(channels)
                .map(|&s| s as f32 / 32768.0)
                .collect();
            resample(&plane, from_rate, to_rate)
        })
        .collect::<Result<Vec<_>>>()?;

    let frames = planes.iter().map(Vec::len).min().unwrap_or(0);
    let mut interleaved = Vec::with_capacity(frames * channels);
    for frame in 0..frames {
        for plane in &planes {
            interleaved.push(to_i16(plane[frame]));
        }
    }

    Ok(interleaved)
}

/// Clamp and scale a float sample to 16-bit PCM
pub fn to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}
