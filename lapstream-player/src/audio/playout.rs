//! Lock-free playout buffer
//!
//! Single-producer single-consumer ring of interleaved samples between the
//! feeder (which renders the `MixerGraph`) and the device callback. The
//! callback only pops from the ring and never touches the mixer lock, so
//! engine-side node changes cannot stall it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use tracing::{debug, warn};

use super::graph::MixerGraph;

/// Frames rendered per mixer pass
const RENDER_BLOCK_FRAMES: usize = 512;

/// Ring of rendered samples, split into its two halves on construction
pub struct PlayoutBuffer;

impl PlayoutBuffer {
    /// Create a ring holding `capacity_frames` frames of `channels` samples
    pub fn new(capacity_frames: usize, channels: u16) -> (PlayoutFeeder, PlayoutReader) {
        let channels = channels.max(1) as usize;
        let capacity = capacity_frames.max(RENDER_BLOCK_FRAMES) * channels;
        let (producer, consumer) = HeapRb::<f32>::new(capacity).split();
        let underruns = Arc::new(AtomicU64::new(0));

        debug!("Playout buffer: {} samples ({} channels)", capacity, channels);

        (
            PlayoutFeeder {
                producer,
                block: vec![0.0; RENDER_BLOCK_FRAMES * channels],
                underruns: Arc::clone(&underruns),
            },
            PlayoutReader { consumer, underruns },
        )
    }
}

/// Producer half: renders the mixer into the ring
pub struct PlayoutFeeder {
    producer: HeapProd<f32>,
    block: Vec<f32>,
    underruns: Arc<AtomicU64>,
}

impl PlayoutFeeder {
    /// Render whole blocks until the ring cannot take another one.
    ///
    /// Returns the number of samples pushed.
    pub fn fill_from(&mut self, mixer: &MixerGraph) -> usize {
        let mut pushed = 0;
        while self.producer.vacant_len() >= self.block.len() {
            mixer.render(&mut self.block);
            pushed += self.producer.push_slice(&self.block);
        }
        pushed
    }

    /// Samples waiting to be played
    pub fn buffered(&self) -> usize {
        self.producer.occupied_len()
    }

    /// Callbacks that found the ring short so far
    pub fn underruns(&self) -> u64 {
        self.underruns.load(Ordering::Relaxed)
    }
}

/// Consumer half: owned by the device callback
pub struct PlayoutReader {
    consumer: HeapCons<f32>,
    underruns: Arc<AtomicU64>,
}

impl PlayoutReader {
    /// Fill `out` from the ring, padding with silence on underrun
    pub fn read(&mut self, out: &mut [f32]) {
        let read = self.consumer.pop_slice(out);
        if read < out.len() {
            out[read..].fill(0.0);
            let count = self.underruns.fetch_add(1, Ordering::Relaxed) + 1;
            if count % 1000 == 1 {
                warn!("Playout underrun: {} of {} samples (total {})", read, out.len(), count);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{AudioGraph, PcmBuffer, PlaybackNode};

    fn mixer_with_tone(value: f32) -> Arc<MixerGraph> {
        let mixer = Arc::new(MixerGraph::new(8_000, 2));
        let buffer = Arc::new(PcmBuffer::new(vec![value; 8_000], 8_000, 1));
        mixer
            .start_node(PlaybackNode {
                chunk_index: 0,
                buffer,
                offset_secs: 0.0,
                duration_secs: 1.0,
            })
            .unwrap();
        mixer
    }

    #[test]
    fn test_reader_plays_rendered_samples() {
        let mixer = mixer_with_tone(0.25);
        let (mut feeder, mut reader) = PlayoutBuffer::new(1_024, 2);

        let pushed = feeder.fill_from(&mixer);
        assert_eq!(pushed, 2_048);
        assert_eq!(feeder.buffered(), 2_048);

        let mut out = vec![0.0f32; 256];
        reader.read(&mut out);
        assert!(out.iter().all(|s| (*s - 0.25).abs() < 1e-6));
        assert_eq!(feeder.underruns(), 0);
    }

    #[test]
    fn test_reader_does_not_need_the_mixer() {
        let mixer = mixer_with_tone(0.5);
        let (mut feeder, mut reader) = PlayoutBuffer::new(1_024, 2);
        feeder.fill_from(&mixer);

        // Engine-side changes after the fill do not reach already rendered audio
        mixer.stop_all();
        drop(mixer);

        let mut out = vec![0.0f32; 512];
        reader.read(&mut out);
        assert!(out.iter().all(|s| (*s - 0.5).abs() < 1e-6));
    }

    #[test]
    fn test_underrun_pads_with_silence() {
        let mixer = mixer_with_tone(0.5);
        let (mut feeder, mut reader) = PlayoutBuffer::new(512, 1);
        feeder.fill_from(&mixer);
        assert_eq!(feeder.buffered(), 512);

        let mut out = vec![1.0f32; 600];
        reader.read(&mut out);
        assert!(out[..512].iter().all(|s| (*s - 0.5).abs() < 1e-6));
        assert!(out[512..].iter().all(|s| *s == 0.0));
        assert_eq!(feeder.underruns(), 1);
    }

    #[test]
    fn test_feeder_stops_when_ring_is_full() {
        let mixer = mixer_with_tone(0.1);
        let (mut feeder, mut reader) = PlayoutBuffer::new(1_024, 2);
        feeder.fill_from(&mixer);
        assert_eq!(feeder.fill_from(&mixer), 0);

        let mut out = vec![0.0f32; 1_024];
        reader.read(&mut out);
        assert_eq!(feeder.fill_from(&mixer), 1_024);
    }
}
