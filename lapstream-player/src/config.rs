//! Configuration management for lapstream-player
//!
//! Two layers:
//! 1. **TOML file** (`PlayerConfig`): engine tuning, logging, output device
//! 2. **Command line**: individual overrides applied by the binary
//!
//! Every field has a built-in default, so an empty or missing file is valid.
//! See `lapstream_common::config` for file discovery order.

use serde::Deserialize;
use std::time::Duration;

use crate::error::{Error, Result};

/// File-level configuration
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PlayerConfig {
    /// Playback engine tuning
    pub engine: EngineConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Audio output configuration
    pub output: OutputConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Audio output configuration
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct OutputConfig {
    /// Output device name (None = system default)
    pub device: Option<String>,
}

/// Playback engine configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Base URL of the chunk service (`{base}/stream/{trackId}/...`)
    pub base_url: String,

    /// Decoded buffers kept in the cache before the oldest insertion is evicted
    pub cache_capacity: usize,

    /// Chunks prefetched at Background priority after a Critical/Immediate load
    pub lookahead_chunks: usize,

    /// Bounded wait for a chunk that playback cannot continue without
    pub chunk_wait_timeout_ms: u64,

    /// Delay before a waiter re-enqueues a failed chunk
    pub chunk_retry_delay_ms: u64,

    /// Fallback play duration when the computed one is not positive
    pub min_play_duration_secs: f64,

    /// Interval of `timeupdate` events while playing
    pub time_update_interval_ms: u64,

    /// Per-request HTTP timeout
    pub request_timeout_ms: u64,

    /// Event bus capacity
    pub event_capacity: usize,

    /// Response header naming the server cache tier that served a chunk
    pub cache_tier_header: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000/api".to_string(),
            cache_capacity: 10,
            lookahead_chunks: 2,
            chunk_wait_timeout_ms: 10_000,
            chunk_retry_delay_ms: 250,
            min_play_duration_secs: 0.1,
            time_update_interval_ms: 250,
            request_timeout_ms: 30_000,
            event_capacity: 256,
            cache_tier_header: "x-cache-tier".to_string(),
        }
    }
}

impl EngineConfig {
    /// Check values that would make the engine misbehave rather than fail loudly
    pub fn validate(&self) -> Result<()> {
        if self.cache_capacity == 0 {
            return Err(Error::Config("cache_capacity must be at least 1".to_string()));
        }
        if !(self.min_play_duration_secs.is_finite() && self.min_play_duration_secs > 0.0) {
            return Err(Error::Config(format!(
                "min_play_duration_secs must be positive, got {}",
                self.min_play_duration_secs
            )));
        }
        if self.time_update_interval_ms == 0 {
            return Err(Error::Config("time_update_interval_ms must be non-zero".to_string()));
        }
        if self.base_url.trim().is_empty() {
            return Err(Error::Config("base_url must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn chunk_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.chunk_wait_timeout_ms)
    }

    pub fn chunk_retry_delay(&self) -> Duration {
        Duration::from_millis(self.chunk_retry_delay_ms)
    }

    pub fn time_update_interval(&self) -> Duration {
        Duration::from_millis(self.time_update_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
