//! Core playback engine - lifecycle and state
//!
//! **Responsibilities:**
//! - `PlaybackEngine` handle and its shared inner state
//! - Lifecycle (`new`, `load_track`, `shutdown`)
//! - State transitions and event emission
//! - Getters and volume
//!
//! All mutable state lives in one `EngineCore` behind a std `Mutex` that is
//! never held across an `.await`. Background work (queue drain, chunk timers,
//! buffering resumes) runs in spawned tasks holding a clone of the handle and
//! re-validates against the `generation`/`epoch` counters after every await.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use lapstream_common::events::{EventBus, PlayerEvent, PlayerState};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::audio::{AudioGraph, NodeId};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::playback::cache::DecodedBufferCache;
use crate::playback::load_queue::PriorityLoadQueue;
use crate::playback::timeline::PlaybackClock;
use crate::playback::types::ChunkPriority;
use crate::stream::{ChunkSource, LoadState, ProcessingProfile, StreamMetadata, StreamSession};

/// A node the engine started and has not stopped yet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct SoundingNode {
    pub(super) node: NodeId,
    pub(super) chunk_index: usize,
}

/// The chunk that currently drives the timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct CurrentChunk {
    /// Unique per chunk start; a newer start supersedes this chunk's end handling
    pub(super) seq: u64,
    pub(super) index: usize,
}

/// Mutable engine state
pub(super) struct EngineCore {
    pub(super) state: PlayerState,
    pub(super) session: Option<StreamSession>,
    pub(super) profile: ProcessingProfile,
    pub(super) cache: DecodedBufferCache,
    pub(super) queue: PriorityLoadQueue,
    pub(super) clock: PlaybackClock,

    /// A drain task is running
    pub(super) draining: bool,

    /// Bumped on every `load_track`; a finished metadata fetch for an older
    /// value is discarded
    pub(super) track_seq: u64,

    /// Bumped on `load_track` and on processing identity changes; chunk loads
    /// and waiters started under an older value are stale
    pub(super) generation: u64,

    /// Bumped on every playback teardown; timers and buffering resumes from an
    /// older epoch do nothing
    pub(super) epoch: u64,

    /// Bumped on every seek; only the latest seek applies its outcome
    pub(super) seek_seq: u64,

    pub(super) play_seq: u64,
    pub(super) current: Option<CurrentChunk>,
    pub(super) sounding: VecDeque<SoundingNode>,

    /// Resume playing when the pending seek completes
    pub(super) resume_after_seek: bool,

    /// The last chunk finished; the next `play()` restarts from 0
    pub(super) ended: bool,

    pub(super) shut_down: bool,
}

impl EngineCore {
    fn new(config: &EngineConfig) -> Self {
        Self {
            state: PlayerState::Idle,
            session: None,
            profile: ProcessingProfile::default(),
            cache: DecodedBufferCache::new(config.cache_capacity),
            queue: PriorityLoadQueue::new(),
            clock: PlaybackClock::default(),
            draining: false,
            track_seq: 0,
            generation: 0,
            epoch: 0,
            seek_seq: 0,
            play_seq: 0,
            current: None,
            sounding: VecDeque::new(),
            resume_after_seek: false,
            ended: false,
            shut_down: false,
        }
    }

    pub(super) fn metadata(&self) -> Option<Arc<StreamMetadata>> {
        self.session.as_ref().map(|s| Arc::clone(s.metadata()))
    }

    /// Timeline position: reconstructed while playing, held otherwise
    pub(super) fn position(&self) -> f64 {
        match (&self.session, self.state) {
            (Some(session), PlayerState::Playing) => self.clock.position(session.metadata(), Instant::now()),
            _ => self.clock.paused_at,
        }
    }
}

pub(super) struct EngineInner {
    pub(super) config: EngineConfig,
    pub(super) source: Arc<dyn ChunkSource>,
    pub(super) graph: Arc<dyn AudioGraph>,
    pub(super) events: EventBus,
    pub(super) core: Mutex<EngineCore>,
    /// Bumped on every slot change; chunk waiters subscribe instead of polling
    pub(super) slot_version: watch::Sender<u64>,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for EngineInner {
    fn drop(&mut self) {
        let ticker = self.ticker.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = ticker.take() {
            handle.abort();
        }
    }
}

/// Progressive chunked-stream playback engine
///
/// Cheap to clone; all clones drive the same engine. Requires a tokio runtime.
#[derive(Clone)]
pub struct PlaybackEngine {
    pub(super) inner: Arc<EngineInner>,
}

impl PlaybackEngine {
    /// Create an engine bound to a chunk source and an output graph.
    ///
    /// Starts the `timeupdate` ticker, which stops by itself once the last
    /// handle is dropped.
    pub fn new(config: EngineConfig, source: Arc<dyn ChunkSource>, graph: Arc<dyn AudioGraph>) -> Result<Self> {
        config.validate()?;

        let events = EventBus::new(config.event_capacity);
        let (slot_version, _) = watch::channel(0u64);
        let tick_interval = config.time_update_interval();

        let inner = Arc::new(EngineInner {
            core: Mutex::new(EngineCore::new(&config)),
            config,
            source,
            graph,
            events,
            slot_version,
            ticker: Mutex::new(None),
        });

        let weak = Arc::downgrade(&inner);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(tick_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else { break };
                PlaybackEngine { inner }.emit_time_update();
            }
        });
        *inner.ticker.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);

        debug!("Playback engine created");
        Ok(Self { inner })
    }

    pub(super) fn lock(&self) -> MutexGuard<'_, EngineCore> {
        self.inner.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(super) fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Wake chunk waiters
    pub(super) fn bump_slot_version(&self) {
        self.inner.slot_version.send_modify(|v| *v = v.wrapping_add(1));
    }

    pub(super) fn emit(&self, event: PlayerEvent) {
        self.inner.events.emit_lossy(event);
    }

    pub(super) fn set_state_locked(&self, core: &mut EngineCore, new_state: PlayerState) {
        let old_state = core.state;
        if old_state == new_state {
            return;
        }
        core.state = new_state;
        debug!("State: {} -> {}", old_state, new_state);
        self.emit(PlayerEvent::StateChanged {
            old_state,
            new_state,
            timestamp: chrono::Utc::now(),
        });
    }

    /// Enter `Error`: stop sounding and report the failure
    pub(super) fn fail_locked(&self, core: &mut EngineCore, err: &Error) {
        error!("Playback failed: {}", err);
        self.stop_sounding_locked(core);
        core.resume_after_seek = false;
        self.set_state_locked(core, PlayerState::Error);
        self.emit(PlayerEvent::Error {
            message: err.to_string(),
            timestamp: chrono::Utc::now(),
        });
    }

    fn ensure_running(core: &EngineCore) -> Result<()> {
        if core.shut_down {
            return Err(Error::InvalidState("engine is shut down".to_string()));
        }
        Ok(())
    }

    /// Metadata of the loaded track, or `NoTrackLoaded`
    pub(super) fn require_track(core: &EngineCore) -> Result<Arc<StreamMetadata>> {
        Self::ensure_running(core)?;
        core.metadata().ok_or(Error::NoTrackLoaded)
    }

    fn emit_time_update(&self) {
        let update = {
            let core = self.lock();
            match (core.state, core.metadata()) {
                (PlayerState::Playing, Some(metadata)) => Some((core.position(), metadata.total_duration)),
                _ => None,
            }
        };
        if let Some((position_secs, duration_secs)) = update {
            self.emit(PlayerEvent::TimeUpdate {
                position_secs,
                duration_secs,
                timestamp: chrono::Utc::now(),
            });
        }
    }

    /// Load a track: fetch metadata and build the chunk table.
    ///
    /// Tears down any current playback. On success the engine is `Ready` at
    /// position 0 and chunk 0 is queued. On failure it enters `Error` and
    /// returns `MetadataUnavailable`. A newer `load_track` that starts before
    /// this one finishes makes this one return `Superseded`.
    pub async fn load_track(&self, track_id: &str) -> Result<()> {
        if track_id.trim().is_empty() {
            return Err(Error::InvalidInput("track id must not be empty".to_string()));
        }

        let track_seq = {
            let mut core = self.lock();
            Self::ensure_running(&core)?;

            self.stop_sounding_locked(&mut core);
            core.track_seq += 1;
            core.generation += 1;
            core.session = None;
            core.queue.clear();
            core.queue.clear_active();
            core.clock.reset();
            core.ended = false;
            core.resume_after_seek = false;
            self.set_state_locked(&mut core, PlayerState::Loading);
            core.track_seq
        };
        self.bump_slot_version();

        info!("Loading track {}", track_id);
        let opened = StreamSession::open(self.inner.source.as_ref(), track_id).await;

        let mut core = self.lock();
        if core.track_seq != track_seq || core.shut_down {
            debug!("Discarding metadata for superseded load of {}", track_id);
            return Err(Error::Superseded(format!("load of track {}", track_id)));
        }

        match opened {
            Ok(session) => {
                core.session = Some(session);
                self.set_state_locked(&mut core, PlayerState::Ready);
                self.enqueue_locked(&mut core, 0, ChunkPriority::Immediate);
                Ok(())
            }
            Err(e) => {
                self.fail_locked(&mut core, &e);
                Err(e)
            }
        }
    }

    /// Stop everything and release background work.
    ///
    /// Further control calls fail with `InvalidState`.
    pub fn shutdown(&self) {
        {
            let mut core = self.lock();
            if core.shut_down {
                return;
            }
            self.stop_sounding_locked(&mut core);
            core.shut_down = true;
            core.generation += 1;
            core.queue.clear();
            core.queue.clear_active();
            core.resume_after_seek = false;
            self.set_state_locked(&mut core, PlayerState::Idle);
        }
        self.bump_slot_version();

        let ticker = self.inner.ticker.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = ticker {
            handle.abort();
        }
        info!("Playback engine shut down");
    }

    /// Subscribe to engine events
    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.inner.events.subscribe()
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.inner.events
    }

    pub fn get_state(&self) -> PlayerState {
        self.lock().state
    }

    /// Track-timeline position in seconds (0 when no track is loaded)
    pub fn get_current_time(&self) -> f64 {
        self.lock().position()
    }

    pub fn get_duration(&self) -> Option<f64> {
        self.lock().metadata().map(|m| m.total_duration)
    }

    pub fn get_volume(&self) -> f32 {
        self.lock().clock.volume
    }

    /// Set master volume, clamped to `[0, 1]`
    pub fn set_volume(&self, volume: f32) -> Result<()> {
        if volume.is_nan() {
            return Err(Error::InvalidInput("volume must be a number".to_string()));
        }
        let volume = volume.clamp(0.0, 1.0);
        let mut core = self.lock();
        core.clock.volume = volume;
        self.inner.graph.set_volume(volume);
        Ok(())
    }

    pub fn metadata(&self) -> Option<Arc<StreamMetadata>> {
        self.lock().metadata()
    }

    pub fn chunk_state(&self, index: usize) -> Option<LoadState> {
        self.lock().session.as_ref().and_then(|s| s.load_state(index))
    }

    pub fn profile(&self) -> ProcessingProfile {
        self.lock().profile.clone()
    }

    /// Number of cached decoded buffers
    pub fn cached_chunks(&self) -> usize {
        self.lock().cache.len()
    }

    pub(super) fn warn_unknown_chunk(&self, index: usize) {
        warn!("Ignoring request for chunk {} outside the track", index);
    }
}
