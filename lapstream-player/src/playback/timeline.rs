//! Timeline math
//!
//! Two pure pieces used by the scheduler:
//! - `plan_chunk`: how long a chunk sounds and when its successor starts
//! - `PlaybackClock::position`: the track-timeline position reconstructed
//!   from the current chunk's start instant
//!
//! Chunk `i` starts at `i * interval` on the track timeline. Its buffer holds
//! `chunk_duration` seconds, the last `overlap` of which sound together with
//! chunk `i + 1`.

use std::time::Duration;

use tokio::time::Instant;
use tracing::warn;

use crate::stream::StreamMetadata;

/// Offsets closer than this to a chunk start count as "from the start"
pub const OFFSET_EPSILON: f64 = 1e-6;

/// How one chunk is played
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkPlan {
    pub chunk_index: usize,
    /// Start position inside the decoded buffer
    pub offset: f64,
    /// Seconds the node sounds
    pub play_duration: f64,
    /// Seconds after start at which chunk `i + 1` begins, if a crossfade applies
    pub crossfade_at: Option<f64>,
    /// True if the computed duration was not positive and the fallback was used
    pub clamped: bool,
}

impl ChunkPlan {
    pub fn play_duration(&self) -> Duration {
        Duration::from_secs_f64(self.play_duration.max(0.0))
    }

    pub fn crossfade_delay(&self) -> Option<Duration> {
        self.crossfade_at.map(|secs| Duration::from_secs_f64(secs.max(0.0)))
    }
}

/// Compute play duration and crossfade point for chunk `index`.
///
/// - From the chunk start (offset 0), not last: sounds `min(buf, chunk_duration)`
///   and the next chunk starts `overlap` seconds before that ends.
/// - From a seek offset: sounds the rest of the buffer, no crossfade.
/// - Last chunk: never runs past the track duration.
/// - Never longer than the buffer remainder; a non-positive result falls back
///   to `min_play_secs`.
pub fn plan_chunk(
    metadata: &StreamMetadata,
    index: usize,
    buffer_secs: f64,
    offset: f64,
    min_play_secs: f64,
) -> ChunkPlan {
    let offset = if offset < OFFSET_EPSILON { 0.0 } else { offset };
    let from_start = offset == 0.0;
    let is_last = metadata.is_last_chunk(index);
    let remainder = buffer_secs - offset;

    let mut play_duration = if from_start {
        buffer_secs.min(metadata.chunk_duration)
    } else {
        remainder
    };

    if is_last {
        let track_left = metadata.total_duration - metadata.timeline_start(index) - offset;
        play_duration = play_duration.min(track_left);
    }

    play_duration = play_duration.min(remainder);

    let mut clamped = false;
    if !(play_duration > 0.0) {
        warn!(
            "Chunk {} has no playable audio (buffer {:.3}s, offset {:.3}s); playing {:.3}s instead",
            index, buffer_secs, offset, min_play_secs
        );
        play_duration = min_play_secs;
        clamped = true;
    }

    let crossfade_at = if from_start && !is_last {
        Some((play_duration - metadata.overlap()).max(0.0))
    } else {
        None
    };

    ChunkPlan {
        chunk_index: index,
        offset,
        play_duration,
        crossfade_at,
        clamped,
    }
}

/// Playback clock
///
/// `current_chunk` and `chunk_started_at` are set once per chunk start.
/// `paused_at` is the authoritative position whenever the engine is not
/// playing.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackClock {
    pub current_chunk: usize,
    pub chunk_started_at: Option<Instant>,
    pub offset_into_chunk: f64,
    pub paused_at: f64,
    pub volume: f32,
}

impl Default for PlaybackClock {
    fn default() -> Self {
        Self {
            current_chunk: 0,
            chunk_started_at: None,
            offset_into_chunk: 0.0,
            paused_at: 0.0,
            volume: 1.0,
        }
    }
}

impl PlaybackClock {
    /// Reset timing for a new track, keeping the volume
    pub fn reset(&mut self) {
        *self = Self {
            volume: self.volume,
            ..Self::default()
        };
    }

    /// Record that chunk `index` started sounding at `now` from `offset`
    pub fn chunk_started(&mut self, index: usize, offset: f64, now: Instant) {
        self.current_chunk = index;
        self.offset_into_chunk = offset;
        self.chunk_started_at = Some(now);
    }

    /// Freeze the clock at `position`
    pub fn hold(&mut self, position: f64) {
        self.paused_at = position;
        self.chunk_started_at = None;
    }

    /// Timeline position while playing.
    ///
    /// `index * interval + offset + elapsed`, clamped to the next chunk's
    /// nominal start (or the track end for the last chunk). Falls back to
    /// `paused_at` if no chunk has started.
    pub fn position(&self, metadata: &StreamMetadata, now: Instant) -> f64 {
        let Some(started) = self.chunk_started_at else {
            return self.paused_at;
        };

        let elapsed = now.saturating_duration_since(started).as_secs_f64();
        let index = self.current_chunk;
        let raw = metadata.timeline_start(index) + self.offset_into_chunk + elapsed;

        let limit = if metadata.is_last_chunk(index) {
            metadata.total_duration
        } else {
            ((index + 1) as f64 * metadata.chunk_interval).min(metadata.total_duration)
        };

        raw.clamp(0.0, limit)
    }
}
