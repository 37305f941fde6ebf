//! Load queue operations
//!
//! A single drain task pops the priority queue and runs one fetch+decode at a
//! time. Cache hits complete without touching the network. Results produced
//! under an older `generation` (track or processing identity changed while
//! the load was in flight) are discarded.

use std::sync::Arc;

use lapstream_common::events::PlayerEvent;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::core::{EngineCore, PlaybackEngine};
use crate::audio::PcmBuffer;
use crate::error::{Error, Result};
use crate::playback::cache::CacheKey;
use crate::playback::load_queue::LoadQueueEntry;
use crate::playback::loader::{self, ChunkRequest};
use crate::playback::types::ChunkPriority;
use crate::stream::{ChunkFailure, LoadState};

/// A load handed from the locked section to the fetch+decode pipeline
pub(super) struct LoadJob {
    pub(super) request: ChunkRequest,
    pub(super) priority: ChunkPriority,
    pub(super) generation: u64,
}

/// What to do with a popped queue entry
enum Prepared {
    /// Already resident or in flight
    Skip,
    /// Served from the decoded cache
    CacheHit,
    Load(LoadJob),
}

impl PlaybackEngine {
    /// Queue a chunk load and make sure a drain task is running
    pub(super) fn enqueue_locked(&self, core: &mut EngineCore, index: usize, priority: ChunkPriority) {
        let Some(session) = core.session.as_ref() else {
            return;
        };
        if index >= session.metadata().total_chunks {
            self.warn_unknown_chunk(index);
            return;
        }

        core.queue.enqueue(index, priority);
        if !core.draining {
            core.draining = true;
            let engine = self.clone();
            tokio::spawn(async move { engine.drain_queue().await });
        }
    }

    /// Request chunk `index` at `priority` without waiting for it.
    ///
    /// Failures surface as `chunk-error` events.
    pub fn enqueue_chunk(&self, index: usize, priority: ChunkPriority) -> Result<()> {
        let mut guard = self.lock();
        let core = &mut *guard;
        let metadata = Self::require_track(core)?;
        if index >= metadata.total_chunks {
            return Err(Error::InvalidInput(format!(
                "chunk {} is outside the track ({} chunks)",
                index, metadata.total_chunks
            )));
        }
        self.enqueue_locked(core, index, priority);
        Ok(())
    }

    /// Pop and load entries until the queue is empty
    async fn drain_queue(&self) {
        loop {
            let job = {
                let mut core = self.lock();
                loop {
                    let Some(entry) = core.queue.pop() else {
                        core.draining = false;
                        return;
                    };
                    match self.prepare_load_locked(&mut core, entry) {
                        Prepared::Skip | Prepared::CacheHit => continue,
                        Prepared::Load(job) => break job,
                    }
                }
            };
            self.bump_slot_version();

            let result = loader::fetch_and_decode(Arc::clone(&self.inner.source), job.request.clone()).await;
            self.finish_load(job, result);
        }
    }

    /// Decide how to serve an entry; marks the slot `Loading` for real loads
    fn prepare_load_locked(&self, core: &mut EngineCore, entry: LoadQueueEntry) -> Prepared {
        let index = entry.chunk_index;
        let generation = core.generation;
        let profile = core.profile.clone();

        let Some(session) = core.session.as_mut() else {
            return Prepared::Skip;
        };
        if session.is_loaded(index) || core.queue.is_active(index) {
            return Prepared::Skip;
        }
        if session.slot(index).is_none() {
            return Prepared::Skip;
        }

        let key = CacheKey::new(session.track_id(), index, &profile);
        if let Some(buffer) = core.cache.get(&key) {
            debug!("Chunk {} served from cache ({})", index, key);
            session.mark_loaded(index, buffer);
            self.emit(PlayerEvent::ChunkLoaded {
                chunk_index: index,
                from_cache: true,
                timestamp: chrono::Utc::now(),
            });
            if entry.priority.triggers_lookahead() {
                self.enqueue_lookahead_locked(core, index);
            }
            self.bump_slot_version();
            return Prepared::CacheHit;
        }

        session.mark_loading(index);
        let request = ChunkRequest {
            track_id: session.track_id().to_string(),
            chunk_index: index,
            profile,
            codec: session.metadata().codec.clone(),
            output_rate: self.inner.graph.sample_rate(),
        };
        core.queue.start_load(index);

        debug!(
            "Loading chunk {} ({:?}, queued {:?} ago)",
            index,
            entry.priority,
            Instant::now().saturating_duration_since(entry.enqueued_at)
        );

        Prepared::Load(LoadJob {
            request,
            priority: entry.priority,
            generation,
        })
    }

    /// Record a pipeline result in the slot table and cache
    pub(super) fn finish_load(&self, job: LoadJob, result: Result<Arc<PcmBuffer>>) {
        let index = job.request.chunk_index;
        {
            let mut guard = self.lock();
            let core = &mut *guard;
            if core.generation != job.generation {
                debug!("Discarding stale load of chunk {}", index);
                return;
            }
            core.queue.finish_load(index);

            let Some(session) = core.session.as_mut() else {
                return;
            };

            match result {
                Ok(buffer) => {
                    session.mark_loaded(index, Arc::clone(&buffer));
                    let key = CacheKey::new(&job.request.track_id, index, &job.request.profile);
                    core.cache.put(key, buffer);
                    self.emit(PlayerEvent::ChunkLoaded {
                        chunk_index: index,
                        from_cache: false,
                        timestamp: chrono::Utc::now(),
                    });
                }
                Err(e) => {
                    warn!("Chunk {} failed: {}", index, e);
                    session.mark_failed(index, ChunkFailure::from_error(&e));
                    self.emit(PlayerEvent::ChunkError {
                        chunk_index: index,
                        error: e.to_string(),
                        timestamp: chrono::Utc::now(),
                    });
                }
            }
            // Look-ahead follows the urgency of the request, not its outcome
            if job.priority.triggers_lookahead() {
                self.enqueue_lookahead_locked(core, index);
            }
        }
        self.bump_slot_version();
    }

    /// Queue the chunks after `index` at Background priority
    fn enqueue_lookahead_locked(&self, core: &mut EngineCore, index: usize) {
        let Some(session) = core.session.as_ref() else {
            return;
        };
        let total = session.metadata().total_chunks;
        let ahead: Vec<usize> = (index + 1..total)
            .take(self.config().lookahead_chunks)
            .filter(|i| !session.is_loaded(*i) && !core.queue.is_active(*i))
            .collect();
        for next in ahead {
            self.enqueue_locked(core, next, ChunkPriority::Background);
        }
    }

    /// Load a chunk outside the queue (used to preload after a preset swap).
    ///
    /// Failures are reported the same way as queued loads.
    pub(super) async fn preload_chunk(&self, index: usize) {
        let job = {
            let mut core = self.lock();
            let entry = LoadQueueEntry {
                chunk_index: index,
                priority: ChunkPriority::Immediate,
                enqueued_at: Instant::now(),
            };
            match self.prepare_load_locked(&mut core, entry) {
                Prepared::Load(job) => job,
                Prepared::Skip | Prepared::CacheHit => return,
            }
        };
        self.bump_slot_version();

        let result = loader::fetch_and_decode(Arc::clone(&self.inner.source), job.request.clone()).await;
        self.finish_load(job, result);
    }

    /// Wait until chunk `index` is resident.
    ///
    /// Queues the chunk at `priority` if nothing is loading it. A failed chunk
    /// is re-queued after `chunk_retry_delay_ms`. Gives up after
    /// `chunk_wait_timeout_ms` with the last failure seen, or `ChunkTimeout`.
    /// Returns `Superseded` if the track or processing identity changes.
    pub(super) async fn wait_for_chunk(&self, index: usize, priority: ChunkPriority) -> Result<()> {
        let timeout = self.config().chunk_wait_timeout();
        let retry_delay = self.config().chunk_retry_delay();
        let deadline = Instant::now() + timeout;
        let mut version_rx = self.inner.slot_version.subscribe();
        let mut retry_at: Option<Instant> = None;
        let mut last_failure: Option<ChunkFailure> = None;

        let generation = self.lock().generation;

        loop {
            {
                let mut guard = self.lock();
                let core = &mut *guard;
                if core.generation != generation || core.shut_down {
                    return Err(Error::Superseded(format!("wait for chunk {}", index)));
                }
                let Some(session) = core.session.as_ref() else {
                    return Err(Error::NoTrackLoaded);
                };
                let Some(slot) = session.slot(index) else {
                    return Err(Error::InvalidInput(format!("chunk {} is outside the track", index)));
                };

                match slot.load_state {
                    LoadState::Loaded if slot.decoded.is_some() => return Ok(()),
                    LoadState::Failed => {
                        last_failure = slot.failure.clone();
                        let now = Instant::now();
                        match retry_at {
                            Some(at) if now >= at => {
                                debug!("Re-queueing failed chunk {}", index);
                                retry_at = None;
                                self.enqueue_locked(core, index, priority);
                            }
                            Some(_) => {}
                            None => retry_at = Some(now + retry_delay),
                        }
                    }
                    LoadState::NotLoaded | LoadState::Loaded => {
                        if !core.queue.contains(index) && !core.queue.is_active(index) {
                            self.enqueue_locked(core, index, priority);
                        }
                    }
                    LoadState::Loading => {}
                }
            }

            if Instant::now() >= deadline {
                break;
            }
            let wake_at = retry_at.map_or(deadline, |at| at.min(deadline));
            tokio::select! {
                changed = version_rx.changed() => {
                    if changed.is_err() {
                        return Err(Error::Superseded(format!("wait for chunk {}", index)));
                    }
                }
                _ = tokio::time::sleep_until(wake_at) => {}
            }
        }

        let error = match last_failure {
            Some(failure) => failure.to_error(index),
            None => Error::ChunkTimeout {
                index,
                waited_ms: timeout.as_millis() as u64,
            },
        };
        warn!("Gave up waiting for chunk {}: {}", index, error);
        Err(error)
    }
}
