//! Chunk resampling using rubato
//!
//! Decoded chunks arrive at whatever rate the chunk service encoded them.
//! The mixer sums frames at a single output rate, so each chunk is converted
//! once, on the blocking pool right after decode, never on the audio thread.

use rubato::{FastFixedIn, PolynomialDegree, Resampler as RubatoResampler};
use tracing::debug;

use super::types::PcmBuffer;
use crate::error::{Error, Result};

/// Whole-buffer sample rate converter
pub struct Resampler;

impl Resampler {
    /// Convert chunk `index` to `output_rate`.
    ///
    /// Returns the buffer untouched when it is already at `output_rate`.
    ///
    /// # Errors
    /// `ChunkDecode` if rubato rejects the conversion.
    pub fn resample(index: usize, buffer: PcmBuffer, output_rate: u32) -> Result<PcmBuffer> {
        if buffer.sample_rate == output_rate || buffer.is_empty() {
            return Ok(buffer);
        }

        let resample_error = |reason: String| Error::ChunkDecode { index, reason };
        let channels = buffer.channels as usize;
        let planar = Self::deinterleave(&buffer.samples, channels);
        let input_frames = buffer.frames();

        let mut resampler = FastFixedIn::<f32>::new(
            output_rate as f64 / buffer.sample_rate as f64,
            1.0,
            PolynomialDegree::Septic,
            input_frames,
            channels,
        )
        .map_err(|e| resample_error(format!("Failed to create resampler: {}", e)))?;

        let output = resampler
            .process(&planar, None)
            .map_err(|e| resample_error(format!("Resampling failed: {}", e)))?;

        let samples = Self::interleave(&output);
        let resampled = PcmBuffer::new(samples, output_rate, buffer.channels);

        debug!(
            "Chunk {} resampled {}Hz -> {}Hz: {} -> {} frames",
            index,
            buffer.sample_rate,
            output_rate,
            input_frames,
            resampled.frames()
        );
        Ok(resampled)
    }

    /// `[L, R, L, R, ...]` to `[[L, L, ...], [R, R, ...]]`
    fn deinterleave(samples: &[f32], channels: usize) -> Vec<Vec<f32>> {
        let frames = samples.len() / channels;
        let mut planar = vec![Vec::with_capacity(frames); channels];
        for frame in samples.chunks_exact(channels) {
            for (channel, sample) in frame.iter().enumerate() {
                planar[channel].push(*sample);
            }
        }
        planar
    }

    fn interleave(planar: &[Vec<f32>]) -> Vec<f32> {
        let Some(first) = planar.first() else {
            return Vec::new();
        };
        let frames = first.len();
        let mut interleaved = Vec::with_capacity(frames * planar.len());
        for frame in 0..frames {
            for channel in planar {
                interleaved.push(channel.get(frame).copied().unwrap_or(0.0));
            }
        }
        interleaved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(rate: u32, channels: u16, frames: usize) -> PcmBuffer {
        let mut samples = Vec::with_capacity(frames * channels as usize);
        for i in 0..frames {
            let t = i as f32 / rate as f32;
            let sample = (2.0 * std::f32::consts::PI * 440.0 * t).sin() * 0.5;
            for _ in 0..channels {
                samples.push(sample);
            }
        }
        PcmBuffer::new(samples, rate, channels)
    }

    #[test]
    fn test_same_rate_is_untouched() {
        let buffer = tone(44_100, 2, 500);
        let output = Resampler::resample(0, buffer.clone(), 44_100).unwrap();
        assert_eq!(output, buffer);
    }

    #[test]
    fn test_upsample_keeps_duration() {
        let buffer = tone(8_000, 1, 8_000);
        let output = Resampler::resample(2, buffer, 44_100).unwrap();

        assert_eq!(output.sample_rate, 44_100);
        assert_eq!(output.channels, 1);
        let frames = output.frames() as i64;
        assert!((frames - 44_100).abs() <= 50, "got {} frames", frames);
    }

    #[test]
    fn test_downsample_stereo() {
        let buffer = tone(48_000, 2, 4_800);
        let output = Resampler::resample(1, buffer, 44_100).unwrap();

        assert_eq!(output.channels, 2);
        let frames = output.frames() as i64;
        assert!((frames - 4_410).abs() <= 20, "got {} frames", frames);
        assert!(output.samples.iter().all(|s| s.abs() <= 1.0));
    }

    #[test]
    fn test_planar_round_trip() {
        let planar = Resampler::deinterleave(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 2);
        assert_eq!(planar, vec![vec![1.0, 3.0, 5.0], vec![2.0, 4.0, 6.0]]);
        assert_eq!(Resampler::interleave(&planar), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert!(Resampler::interleave(&[]).is_empty());
    }
}
