//! # Lapstream Common Library
//!
//! Shared code for the lapstream player and anything that drives it:
//! - Event types (`PlayerEvent`, `PlayerState`) and the broadcast `EventBus`
//! - Common error type
//! - Configuration file discovery
//! - Human-readable time formatting for logs and CLI output

pub mod config;
pub mod error;
pub mod events;
pub mod human_time;

pub use error::{Error, Result};
pub use events::{EventBus, PlayerEvent, PlayerState};
