//! Playback engine
//!
//! **Module Structure:**
//! - `core.rs`: struct, lifecycle (`new`, `load_track`, `shutdown`), state and getters
//! - `queue.rs`: load queue drain, fetch+decode bookkeeping, waiting for chunks
//! - `playback.rs`: play/pause/stop/seek, chunk scheduling and crossfade timers
//! - `preset.rs`: processing profile changes (enhancement, preset, intensity)
//! - `diagnostics.rs`: state snapshot for monitoring

mod core;
mod diagnostics;
mod playback;
mod preset;
mod queue;

pub use self::core::PlaybackEngine;
pub use self::diagnostics::EngineDiagnostics;
