//! Core audio data types

/// Decoded PCM for one chunk
///
/// **Format:**
/// - Samples are f32 (-1.0 to 1.0)
/// - Interleaved: `[L, R, L, R, ...]` for stereo, one sample per frame for mono
/// - Source sample rate after decode; `Resampler` converts it to the output rate
#[derive(Debug, Clone, PartialEq)]
pub struct PcmBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl PcmBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        Self {
            samples,
            sample_rate,
            channels,
        }
    }

    /// Number of frames (samples per channel)
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }

    /// Buffer duration in seconds
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    pub fn is_empty(&self) -> bool {
        self.frames() == 0
    }

    /// Sample at `frame` for output channel `channel`.
    ///
    /// Mono sources feed every output channel; missing channels read as silence.
    pub fn sample(&self, frame: usize, channel: usize) -> f32 {
        let channels = self.channels as usize;
        if channels == 0 || frame >= self.frames() {
            return 0.0;
        }
        let source_channel = if channels == 1 { 0 } else { channel };
        if source_channel >= channels {
            return 0.0;
        }
        self.samples[frame * channels + source_channel]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_and_frames() {
        let buffer = PcmBuffer::new(vec![0.0; 88_200], 44_100, 2);
        assert_eq!(buffer.frames(), 44_100);
        assert!((buffer.duration_secs() - 1.0).abs() < 1e-9);
        assert!(!buffer.is_empty());
    }

    #[test]
    fn test_mono_feeds_both_channels() {
        let buffer = PcmBuffer::new(vec![0.25, 0.5], 8_000, 1);
        assert_eq!(buffer.sample(1, 0), 0.5);
        assert_eq!(buffer.sample(1, 1), 0.5);
        assert_eq!(buffer.sample(2, 0), 0.0);
    }

    #[test]
    fn test_degenerate_buffers() {
        assert_eq!(PcmBuffer::new(vec![1.0], 0, 1).duration_secs(), 0.0);
        assert_eq!(PcmBuffer::new(vec![1.0], 44_100, 0).frames(), 0);
    }
}
