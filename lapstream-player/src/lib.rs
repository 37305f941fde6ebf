//! # Lapstream Player Library
//!
//! Progressive playback engine for tracks delivered as overlapping,
//! independently fetchable compressed chunks.
//!
//! **Purpose:** Resolve stream metadata, fetch and decode chunks through a
//! priority load queue and a decoded-buffer cache, and schedule gapless,
//! overlap-aligned playback while reconstructing one continuous timeline.
//!
//! **Architecture:** reqwest chunk source, symphonia decoding, a two-node
//! mixing graph (optionally driven by cpal), and a tokio-based engine that
//! owns all state transitions.

pub mod audio;
pub mod config;
pub mod error;
pub mod playback;
pub mod stream;

pub use config::{EngineConfig, PlayerConfig};
pub use error::{Error, Result};
pub use playback::PlaybackEngine;
