//! Chunk source abstraction
//!
//! The engine only talks to the chunk service through `ChunkSource`, so tests
//! can substitute an in-memory source for the HTTP one.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::metadata::StreamMetadata;
use crate::error::Result;

/// Server-side processing variant requested for chunks
///
/// `(enhanced, preset)` is the processing identity: it changes the bytes the
/// server returns for a chunk index, so it is part of the decoded cache key.
/// `intensity` only tunes future requests and is not part of the identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingProfile {
    pub enhanced: bool,
    pub preset: Option<String>,
    pub intensity: f32,
}

impl Default for ProcessingProfile {
    fn default() -> Self {
        Self {
            enhanced: false,
            preset: None,
            intensity: 1.0,
        }
    }
}

impl ProcessingProfile {
    pub fn new(enhanced: bool, preset: Option<String>) -> Self {
        Self {
            enhanced,
            preset,
            ..Self::default()
        }
    }

    /// True if both profiles produce the same chunk bytes
    pub fn same_identity(&self, other: &ProcessingProfile) -> bool {
        self.enhanced == other.enhanced && self.preset == other.preset
    }
}

/// Source of stream metadata and encoded chunk bytes
#[async_trait]
pub trait ChunkSource: Send + Sync {
    /// Fetch and validate metadata for a track.
    ///
    /// Fails with `MetadataUnavailable` when the service is unreachable or the
    /// response is malformed.
    async fn fetch_metadata(&self, track_id: &str) -> Result<StreamMetadata>;

    /// Fetch the encoded bytes of one chunk under a processing profile.
    ///
    /// Fails with `ChunkFetch` on transport errors, non-success responses and
    /// zero-length bodies.
    async fn fetch_chunk(&self, track_id: &str, index: usize, profile: &ProcessingProfile) -> Result<Vec<u8>>;
}
