//! Stream session and chunk sources
//!
//! A track is served as `total_chunks` overlapping chunks. This module owns
//! the metadata model, the per-track chunk table and the network contract.

pub mod http;
pub mod metadata;
pub mod session;
pub mod source;

pub use http::HttpChunkSource;
pub use metadata::{CodecInfo, MetadataResponse, StreamMetadata};
pub use session::{ChunkFailure, ChunkSlot, FailureKind, LoadState, StreamSession};
pub use source::{ChunkSource, ProcessingProfile};
