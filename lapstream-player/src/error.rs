//! Error types for lapstream-player
//!
//! Per-chunk failures (`ChunkFetch`, `ChunkDecode`) are normally reported as
//! events. They only surface as `Err` when an operation the caller is waiting
//! on (play, seek) cannot complete without that chunk.

use thiserror::Error;

/// Main error type for lapstream-player
#[derive(Error, Debug)]
pub enum Error {
    /// Stream metadata could not be fetched or was malformed
    #[error("Stream metadata unavailable for track {track_id}: {reason}")]
    MetadataUnavailable { track_id: String, reason: String },

    /// Chunk request failed, returned a non-success status, or had an empty body
    #[error("Chunk {index} fetch failed: {reason}")]
    ChunkFetch { index: usize, reason: String },

    /// Chunk bytes could not be decoded to PCM
    #[error("Chunk {index} decode failed: {reason}")]
    ChunkDecode { index: usize, reason: String },

    /// A mandatory chunk never became resident within the wait window
    #[error("Chunk {index} not resident after {waited_ms}ms")]
    ChunkTimeout { index: usize, waited_ms: u64 },

    /// Seek target is not a finite number (finite out-of-range targets are clamped)
    #[error("Invalid seek target: {requested}")]
    InvalidSeekTarget { requested: f64 },

    /// Playback control called before a track finished loading
    #[error("No track loaded")]
    NoTrackLoaded,

    /// Invalid state for operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Invalid argument
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The operation was overtaken by a newer one (e.g. another load_track)
    #[error("Superseded: {0}")]
    Superseded(String),

    /// Audio output device errors
    #[error("Audio output error: {0}")]
    AudioOutput(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors from shared lapstream code
    #[error(transparent)]
    Common(#[from] lapstream_common::Error),
}

impl Error {
    /// True for errors tied to a single chunk that a re-enqueue may fix
    pub fn is_chunk_error(&self) -> bool {
        matches!(
            self,
            Error::ChunkFetch { .. } | Error::ChunkDecode { .. } | Error::ChunkTimeout { .. }
        )
    }
}

/// Convenience Result type using lapstream-player Error
pub type Result<T> = std::result::Result<T, Error>;
