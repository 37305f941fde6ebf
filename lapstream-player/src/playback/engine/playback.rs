//! Playback control and chunk scheduling
//!
//! **Responsibilities:**
//! - play / pause / stop / seek
//! - Starting a chunk's node and arming its crossfade and end timers
//! - Continuing to the next chunk, buffering when it is not resident
//!
//! Chunk `i` starts at timeline `i * interval`. When played from its start it
//! arms a crossfade timer at `play_duration - overlap` that starts chunk
//! `i + 1` while `i` is still sounding, so the two overlap for the server-side
//! blended region. The end timer stops `i`'s node and, if nothing has started
//! the successor yet, continues or buffers.

use lapstream_common::events::{PlayerEvent, PlayerState};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::core::{CurrentChunk, EngineCore, PlaybackEngine, SoundingNode};
use crate::audio::{NodeId, PlaybackNode, MAX_ACTIVE_NODES};
use crate::error::{Error, Result};
use crate::playback::timeline::plan_chunk;
use crate::playback::types::ChunkPriority;

impl PlaybackEngine {
    /// Start or resume playback from the current position.
    ///
    /// - Already `Playing`/`Buffering`: no-op
    /// - `Seeking`: playback resumes when the seek completes
    /// - After `ended`: restarts from 0
    ///
    /// If the needed chunk is not resident the engine enters `Buffering` and
    /// this call waits for it. A chunk that cannot be loaded within the wait
    /// window moves the engine to `Error` and the chunk error is returned.
    pub async fn play(&self) -> Result<()> {
        let (index, offset, epoch) = {
            let mut guard = self.lock();
            let core = &mut *guard;
            let metadata = Self::require_track(core)?;

            match core.state {
                PlayerState::Playing | PlayerState::Buffering => return Ok(()),
                PlayerState::Seeking => {
                    core.resume_after_seek = true;
                    return Ok(());
                }
                PlayerState::Loading => return Err(Error::NoTrackLoaded),
                PlayerState::Error => {
                    return Err(Error::InvalidState(
                        "player is in error state; load a track to recover".to_string(),
                    ))
                }
                PlayerState::Idle | PlayerState::Ready | PlayerState::Paused => {}
            }

            if core.ended {
                core.ended = false;
                core.clock.hold(0.0);
            }

            let (index, offset) = metadata.locate(core.clock.paused_at);
            if core.session.as_ref().map(|s| s.is_loaded(index)).unwrap_or(false) {
                self.start_chunk_locked(core, index, offset)?;
                self.set_state_locked(core, PlayerState::Playing);
                return Ok(());
            }

            debug!("Chunk {} not resident, buffering", index);
            self.set_state_locked(core, PlayerState::Buffering);
            self.enqueue_locked(core, index, ChunkPriority::Critical);
            (index, offset, core.epoch)
        };

        self.resume_when_loaded(index, offset, epoch).await
    }

    /// Wait for a chunk while `Buffering`, then start it.
    ///
    /// Does nothing if playback was torn down (pause, stop, seek) meanwhile.
    pub(super) async fn resume_when_loaded(&self, index: usize, offset: f64, epoch: u64) -> Result<()> {
        let waited = self.wait_for_chunk(index, ChunkPriority::Critical).await;

        let mut guard = self.lock();
        let core = &mut *guard;
        if core.epoch != epoch || core.state != PlayerState::Buffering {
            return Ok(());
        }

        match waited {
            Ok(()) => {
                info!("Chunk {} resident, resuming playback", index);
                if let Err(e) = self.start_chunk_locked(core, index, offset) {
                    self.fail_locked(core, &e);
                    return Err(e);
                }
                self.set_state_locked(core, PlayerState::Playing);
                Ok(())
            }
            Err(Error::Superseded(_)) => Ok(()),
            Err(e) => {
                self.fail_locked(core, &e);
                Err(e)
            }
        }
    }

    /// Pause at the current position.
    ///
    /// While `Buffering` this cancels the pending start; while `Seeking` it
    /// cancels the resume after the seek.
    pub fn pause(&self) -> Result<()> {
        let mut guard = self.lock();
        let core = &mut *guard;
        Self::require_track(core)?;

        match core.state {
            PlayerState::Playing => {
                let position = core.position();
                self.stop_sounding_locked(core);
                core.clock.hold(position);
                self.set_state_locked(core, PlayerState::Paused);
                debug!("Paused at {:.3}s", position);
            }
            PlayerState::Buffering => {
                self.stop_sounding_locked(core);
                self.set_state_locked(core, PlayerState::Paused);
            }
            PlayerState::Seeking => {
                core.resume_after_seek = false;
            }
            _ => {}
        }
        Ok(())
    }

    /// Stop playback and rewind to 0. The track stays loaded.
    pub fn stop(&self) -> Result<()> {
        let mut guard = self.lock();
        let core = &mut *guard;
        Self::require_track(core)?;
        if core.state == PlayerState::Error {
            return Ok(());
        }

        self.stop_sounding_locked(core);
        core.clock.hold(0.0);
        core.ended = false;
        core.resume_after_seek = false;
        core.seek_seq += 1;
        self.set_state_locked(core, PlayerState::Idle);
        Ok(())
    }

    /// Seek to `time` seconds; returns the position actually used.
    ///
    /// Finite targets are clamped into `[0, duration]`. The target chunk is
    /// queued at SeekTarget priority and its neighbors at Adjacent. Once it is
    /// resident the engine ends `Paused` at the target, or `Playing` if it was
    /// playing before the seek (or `play()` was called meanwhile).
    pub async fn seek(&self, time: f64) -> Result<f64> {
        if !time.is_finite() {
            return Err(Error::InvalidSeekTarget { requested: time });
        }

        let (target, index, offset, seek_seq) = {
            let mut guard = self.lock();
            let core = &mut *guard;
            let metadata = Self::require_track(core)?;
            if core.state == PlayerState::Error {
                return Err(Error::InvalidState(
                    "player is in error state; load a track to recover".to_string(),
                ));
            }

            let was_playing =
                core.state.is_active() || (core.state == PlayerState::Seeking && core.resume_after_seek);
            let target = metadata.clamp_time(time);
            if target != time {
                debug!("Seek target {:.3}s clamped to {:.3}s", time, target);
            }
            let (index, offset) = metadata.locate(target);

            self.stop_sounding_locked(core);
            core.clock.hold(target);
            core.ended = false;
            core.resume_after_seek = was_playing;
            core.seek_seq += 1;
            self.set_state_locked(core, PlayerState::Seeking);

            self.enqueue_locked(core, index, ChunkPriority::SeekTarget);
            if index > 0 {
                self.enqueue_locked(core, index - 1, ChunkPriority::Adjacent);
            }
            if index + 1 < metadata.total_chunks {
                self.enqueue_locked(core, index + 1, ChunkPriority::Adjacent);
            }

            info!("Seeking to {:.3}s (chunk {} + {:.3}s)", target, index, offset);
            (target, index, offset, core.seek_seq)
        };

        let waited = self.wait_for_chunk(index, ChunkPriority::SeekTarget).await;

        let mut guard = self.lock();
        let core = &mut *guard;
        if core.seek_seq != seek_seq || core.state != PlayerState::Seeking {
            // A newer seek, stop or load took over
            return match waited {
                Err(Error::Superseded(_)) | Ok(()) => Ok(target),
                Err(e) => Err(e),
            };
        }

        if let Err(e) = waited {
            self.fail_locked(core, &e);
            return Err(e);
        }

        let resume = std::mem::take(&mut core.resume_after_seek);
        if resume {
            if let Err(e) = self.start_chunk_locked(core, index, offset) {
                self.fail_locked(core, &e);
                return Err(e);
            }
            self.set_state_locked(core, PlayerState::Playing);
        } else {
            self.set_state_locked(core, PlayerState::Paused);
        }
        Ok(target)
    }

    /// Start chunk `index` sounding from `offset` and arm its timers
    pub(super) fn start_chunk_locked(&self, core: &mut EngineCore, index: usize, offset: f64) -> Result<()> {
        let session = core.session.as_ref().ok_or(Error::NoTrackLoaded)?;
        let metadata = std::sync::Arc::clone(session.metadata());
        let buffer = session
            .buffer(index)
            .ok_or_else(|| Error::InvalidState(format!("chunk {} is not resident", index)))?;

        let plan = plan_chunk(
            &metadata,
            index,
            buffer.duration_secs(),
            offset,
            self.config().min_play_duration_secs,
        );

        while core.sounding.len() >= MAX_ACTIVE_NODES {
            if let Some(oldest) = core.sounding.pop_front() {
                warn!(
                    "Already {} nodes sounding, stopping chunk {} early",
                    MAX_ACTIVE_NODES, oldest.chunk_index
                );
                self.inner.graph.stop_node(oldest.node);
            }
        }

        let node = self.inner.graph.start_node(PlaybackNode {
            chunk_index: index,
            buffer,
            offset_secs: plan.offset,
            duration_secs: plan.play_duration,
        })?;
        core.sounding.push_back(SoundingNode { node, chunk_index: index });

        core.play_seq += 1;
        let seq = core.play_seq;
        let epoch = core.epoch;
        core.current = Some(CurrentChunk { seq, index });
        core.clock.chunk_started(index, plan.offset, Instant::now());

        debug!(
            "Chunk {} started at +{:.3}s for {:.3}s{}",
            index,
            plan.offset,
            plan.play_duration,
            plan.crossfade_at
                .map(|at| format!(", next at {:.3}s", at))
                .unwrap_or_default()
        );

        let engine = self.clone();
        let play_duration = plan.play_duration();
        tokio::spawn(async move {
            tokio::time::sleep(play_duration).await;
            engine.on_chunk_ended(epoch, seq, index, node);
        });

        if let Some(delay) = plan.crossfade_delay() {
            let engine = self.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                engine.on_crossfade_due(epoch, seq, index);
            });
        }

        if !metadata.is_last_chunk(index) {
            self.enqueue_locked(core, index + 1, ChunkPriority::Immediate);
        }
        Ok(())
    }

    /// True if the chunk started with `seq` still drives playback in `epoch`
    fn is_current(core: &EngineCore, epoch: u64, seq: u64) -> bool {
        core.epoch == epoch
            && core.state == PlayerState::Playing
            && core.current.map(|c| c.seq == seq).unwrap_or(false)
    }

    /// Crossfade point of chunk `index`: start its successor if resident
    fn on_crossfade_due(&self, epoch: u64, seq: u64, index: usize) {
        let mut guard = self.lock();
        let core = &mut *guard;
        if !Self::is_current(core, epoch, seq) {
            return;
        }

        let next = index + 1;
        let resident = core.session.as_ref().map(|s| s.is_loaded(next)).unwrap_or(false);
        if resident {
            debug!("Crossfading chunk {} -> {}", index, next);
            if let Err(e) = self.start_chunk_locked(core, next, 0.0) {
                self.fail_locked(core, &e);
            }
        } else {
            // The end of `index` will buffer if it is still missing by then
            warn!("Chunk {} not resident at crossfade point", next);
            self.enqueue_locked(core, next, ChunkPriority::Critical);
        }
    }

    /// Natural end of chunk `index`'s node
    fn on_chunk_ended(&self, epoch: u64, seq: u64, index: usize, node: NodeId) {
        let mut guard = self.lock();
        let core = &mut *guard;
        if core.epoch != epoch {
            return;
        }

        self.inner.graph.stop_node(node);
        core.sounding.retain(|s| s.node != node);

        if !Self::is_current(core, epoch, seq) {
            return;
        }
        let Some(metadata) = core.metadata() else {
            return;
        };

        if metadata.is_last_chunk(index) {
            info!("Track {} ended", metadata.track_id);
            core.current = None;
            core.clock.hold(metadata.total_duration);
            core.ended = true;
            self.set_state_locked(core, PlayerState::Idle);
            self.emit(PlayerEvent::Ended {
                track_id: metadata.track_id.clone(),
                timestamp: chrono::Utc::now(),
            });
            return;
        }

        let next = index + 1;
        let resident = core.session.as_ref().map(|s| s.is_loaded(next)).unwrap_or(false);
        if resident {
            if let Err(e) = self.start_chunk_locked(core, next, 0.0) {
                self.fail_locked(core, &e);
            }
            return;
        }

        warn!("Chunk {} not resident at end of chunk {}, buffering", next, index);
        core.current = None;
        core.clock.hold(metadata.timeline_start(next));
        self.set_state_locked(core, PlayerState::Buffering);
        self.enqueue_locked(core, next, ChunkPriority::Critical);

        let engine = self.clone();
        let epoch = core.epoch;
        tokio::spawn(async move {
            // Failures already moved the engine to Error and emitted an event
            if let Err(e) = engine.resume_when_loaded(next, 0.0, epoch).await {
                debug!("Buffering for chunk {} ended without resuming: {}", next, e);
            }
        });
    }

    /// Silence every node and invalidate pending timers
    pub(super) fn stop_sounding_locked(&self, core: &mut EngineCore) {
        if !core.sounding.is_empty() {
            self.inner.graph.stop_all();
            core.sounding.clear();
        }
        core.current = None;
        core.epoch += 1;
    }

    /// Chunk indices of sounding nodes, oldest first
    pub(super) fn sounding_chunks_locked(core: &EngineCore) -> Vec<usize> {
        core.sounding.iter().map(|s| s.chunk_index).collect()
    }
}
