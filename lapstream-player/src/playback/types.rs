//! Playback types shared across modules

use serde::{Deserialize, Serialize};

/// Chunk load priority (lower value = more urgent)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ChunkPriority {
    /// Chunk currently sounding (or the chunk playback is stalled on)
    Critical = 0,

    /// Chunk needed next for uninterrupted playback
    Immediate = 1,

    /// User just sought here
    SeekTarget = 2,

    /// Neighbor of a seek target (speculative)
    Adjacent = 3,

    /// Ordinary look-ahead prefetch
    Background = 4,
}

impl ChunkPriority {
    pub fn value(self) -> u8 {
        self as u8
    }

    /// Critical and Immediate loads trigger look-ahead prefetch
    pub fn triggers_lookahead(self) -> bool {
        self <= ChunkPriority::Immediate
    }
}
