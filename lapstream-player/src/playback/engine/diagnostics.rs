//! Engine diagnostics
//!
//! A consistent snapshot of engine internals taken under one lock, for logs,
//! tests and status endpoints of whatever drives the engine.

use lapstream_common::events::PlayerState;
use serde::Serialize;

use super::core::PlaybackEngine;
use crate::playback::cache::CacheKey;
use crate::playback::types::ChunkPriority;
use crate::stream::ProcessingProfile;

/// Point-in-time view of the engine
#[derive(Debug, Clone, Serialize)]
pub struct EngineDiagnostics {
    pub state: PlayerState,
    pub position_secs: f64,
    pub track_id: Option<String>,
    pub profile: ProcessingProfile,
    /// Cached buffers in insertion order, oldest first
    #[serde(skip)]
    pub cache_keys: Vec<CacheKey>,
    pub cached_chunks: usize,
    /// Pending loads in drain order
    pub queued: Vec<(usize, ChunkPriority)>,
    pub active_loads: Vec<usize>,
    /// Resident chunk indices, ascending
    pub loaded_chunks: Vec<usize>,
    /// Chunks whose nodes are sounding, oldest first
    pub sounding_chunks: Vec<usize>,
    pub current_chunk: Option<usize>,
    pub volume: f32,
}

impl PlaybackEngine {
    pub fn diagnostics(&self) -> EngineDiagnostics {
        let core = self.lock();
        EngineDiagnostics {
            state: core.state,
            position_secs: core.position(),
            track_id: core.session.as_ref().map(|s| s.track_id().to_string()),
            profile: core.profile.clone(),
            cache_keys: core.cache.keys(),
            cached_chunks: core.cache.len(),
            queued: core
                .queue
                .entries()
                .into_iter()
                .map(|e| (e.chunk_index, e.priority))
                .collect(),
            active_loads: core.queue.active_loads(),
            loaded_chunks: core.session.as_ref().map(|s| s.loaded_indices()).unwrap_or_default(),
            sounding_chunks: Self::sounding_chunks_locked(&core),
            current_chunk: core.current.map(|c| c.index),
            volume: core.clock.volume,
        }
    }
}
