//! Stream session: metadata plus the per-track chunk table
//!
//! One `ChunkSlot` per chunk index. Slot timeline bounds derive from
//! `chunk_interval`, never from `chunk_duration`.

use std::sync::Arc;

use tracing::info;

use super::metadata::StreamMetadata;
use super::source::ChunkSource;
use crate::audio::PcmBuffer;
use crate::error::{Error, Result};

/// Load state of a chunk slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadState {
    NotLoaded,
    Loading,
    Loaded,
    Failed,
}

/// Which pipeline stage failed for a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Fetch,
    Decode,
}

/// Last failure recorded for a slot
///
/// Kept as plain data so a waiter can rebuild the matching error after the
/// original `Error` value has been reported as an event.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl ChunkFailure {
    /// Capture a pipeline error; errors other than fetch/decode count as fetch failures
    pub fn from_error(error: &Error) -> Self {
        match error {
            Error::ChunkDecode { reason, .. } => Self {
                kind: FailureKind::Decode,
                message: reason.clone(),
            },
            Error::ChunkFetch { reason, .. } => Self {
                kind: FailureKind::Fetch,
                message: reason.clone(),
            },
            other => Self {
                kind: FailureKind::Fetch,
                message: other.to_string(),
            },
        }
    }

    pub fn to_error(&self, index: usize) -> Error {
        let reason = self.message.clone();
        match self.kind {
            FailureKind::Fetch => Error::ChunkFetch { index, reason },
            FailureKind::Decode => Error::ChunkDecode { index, reason },
        }
    }
}

/// One entry in the chunk table
#[derive(Debug, Clone)]
pub struct ChunkSlot {
    pub index: usize,
    pub timeline_start: f64,
    pub timeline_end: f64,
    pub decoded: Option<Arc<PcmBuffer>>,
    pub load_state: LoadState,
    pub failure: Option<ChunkFailure>,
}

impl ChunkSlot {
    fn new(index: usize, timeline_start: f64, timeline_end: f64) -> Self {
        Self {
            index,
            timeline_start,
            timeline_end,
            decoded: None,
            load_state: LoadState::NotLoaded,
            failure: None,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.load_state == LoadState::Loaded && self.decoded.is_some()
    }
}

/// Metadata and chunk table for the currently loaded track
#[derive(Debug, Clone)]
pub struct StreamSession {
    metadata: Arc<StreamMetadata>,
    slots: Vec<ChunkSlot>,
}

impl StreamSession {
    /// Resolve metadata for `track_id` and build the chunk table
    pub async fn open(source: &dyn ChunkSource, track_id: &str) -> Result<Self> {
        let metadata = source.fetch_metadata(track_id).await?;
        if metadata.track_id != track_id {
            return Err(Error::MetadataUnavailable {
                track_id: track_id.to_string(),
                reason: format!("service answered for track {}", metadata.track_id),
            });
        }

        info!(
            "Opened stream {}: {:.1}s, {} chunks ({}s every {}s, {}s overlap)",
            track_id,
            metadata.total_duration,
            metadata.total_chunks,
            metadata.chunk_duration,
            metadata.chunk_interval,
            metadata.overlap()
        );

        Ok(Self::new(metadata))
    }

    /// Build a session from already validated metadata
    pub fn new(metadata: StreamMetadata) -> Self {
        let slots = (0..metadata.total_chunks)
            .map(|i| ChunkSlot::new(i, metadata.timeline_start(i), metadata.timeline_end(i)))
            .collect();
        Self {
            metadata: Arc::new(metadata),
            slots,
        }
    }

    pub fn metadata(&self) -> &Arc<StreamMetadata> {
        &self.metadata
    }

    pub fn track_id(&self) -> &str {
        &self.metadata.track_id
    }

    pub fn slots(&self) -> &[ChunkSlot] {
        &self.slots
    }

    pub fn slot(&self, index: usize) -> Option<&ChunkSlot> {
        self.slots.get(index)
    }

    pub fn load_state(&self, index: usize) -> Option<LoadState> {
        self.slots.get(index).map(|s| s.load_state)
    }

    pub fn is_loaded(&self, index: usize) -> bool {
        self.slots.get(index).map(ChunkSlot::is_loaded).unwrap_or(false)
    }

    /// Decoded buffer of a resident chunk
    pub fn buffer(&self, index: usize) -> Option<Arc<PcmBuffer>> {
        self.slots
            .get(index)
            .filter(|s| s.load_state == LoadState::Loaded)
            .and_then(|s| s.decoded.clone())
    }

    pub fn mark_loading(&mut self, index: usize) {
        if let Some(slot) = self.slots.get_mut(index) {
            slot.load_state = LoadState::Loading;
        }
    }

    pub fn mark_loaded(&mut self, index: usize, buffer: Arc<PcmBuffer>) {
        if let Some(slot) = self.slots.get_mut(index) {
            slot.decoded = Some(buffer);
            slot.load_state = LoadState::Loaded;
            slot.failure = None;
        }
    }

    /// Mark a slot failed, dropping any buffer so the slot is eligible for retry
    pub fn mark_failed(&mut self, index: usize, failure: ChunkFailure) {
        if let Some(slot) = self.slots.get_mut(index) {
            slot.decoded = None;
            slot.load_state = LoadState::Failed;
            slot.failure = Some(failure);
        }
    }

    /// Forget every decoded buffer (processing identity changed)
    pub fn reset_slots(&mut self) {
        for slot in &mut self.slots {
            slot.decoded = None;
            slot.load_state = LoadState::NotLoaded;
            slot.failure = None;
        }
    }

    pub fn loaded_indices(&self) -> Vec<usize> {
        self.slots.iter().filter(|s| s.is_loaded()).map(|s| s.index).collect()
    }
}
