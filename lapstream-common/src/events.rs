//! Event types for the lapstream event system
//!
//! Provides the player state enum, the event union emitted by the playback
//! engine, and the broadcast `EventBus` that carries events to listeners.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Player state enumeration
///
/// There is exactly one authoritative value at any time. `Error` is only left
/// by loading a fresh track.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PlayerState {
    /// No playback in progress (initial state, after stop, after a track ended)
    Idle,
    /// Stream metadata is being fetched
    Loading,
    /// Metadata loaded, chunk table built, nothing played yet
    Ready,
    /// Audio is sounding
    Playing,
    /// Playback paused at a remembered position
    Paused,
    /// Playback requested but the needed chunk is not resident yet
    Buffering,
    /// Waiting for a seek target chunk to become resident
    Seeking,
    /// Unrecoverable failure for the current track
    Error,
}

impl PlayerState {
    /// True when audio is sounding or about to sound without further user action
    pub fn is_active(&self) -> bool {
        matches!(self, PlayerState::Playing | PlayerState::Buffering)
    }
}

impl std::fmt::Display for PlayerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PlayerState::Idle => "idle",
            PlayerState::Loading => "loading",
            PlayerState::Ready => "ready",
            PlayerState::Playing => "playing",
            PlayerState::Paused => "paused",
            PlayerState::Buffering => "buffering",
            PlayerState::Seeking => "seeking",
            PlayerState::Error => "error",
        };
        write!(f, "{}", name)
    }
}

/// Player event types
///
/// Events are broadcast via `EventBus` and serialize with a `type` tag so they
/// can be forwarded to other processes unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PlayerEvent {
    /// Player state changed
    #[serde(rename = "statechange")]
    StateChanged {
        /// State before the change
        old_state: PlayerState,
        /// State after the change
        new_state: PlayerState,
        /// When the state changed
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Periodic timeline position update, emitted while playing
    #[serde(rename = "timeupdate")]
    TimeUpdate {
        /// Reconstructed track timeline position in seconds
        position_secs: f64,
        /// Total track duration in seconds
        duration_secs: f64,
        /// When the position was sampled
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The last chunk of the track finished playing
    #[serde(rename = "ended")]
    Ended {
        /// Track that finished
        track_id: String,
        /// When playback ended
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A fatal error moved the player into the `Error` state
    #[serde(rename = "error")]
    Error {
        /// Human-readable error description
        message: String,
        /// When the error occurred
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A single chunk failed to fetch or decode (recoverable by re-enqueue)
    #[serde(rename = "chunk-error")]
    ChunkError {
        /// Chunk index that failed
        chunk_index: usize,
        /// Failure description
        error: String,
        /// When the failure was observed
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A chunk became resident
    #[serde(rename = "chunk-loaded")]
    ChunkLoaded {
        /// Chunk index that was loaded
        chunk_index: usize,
        /// True if the buffer came from the decoded-buffer cache
        from_cache: bool,
        /// When the chunk became resident
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl PlayerEvent {
    /// Wire name of the event, matching the serialized `type` tag
    pub fn event_type(&self) -> &'static str {
        match self {
            PlayerEvent::StateChanged { .. } => "statechange",
            PlayerEvent::TimeUpdate { .. } => "timeupdate",
            PlayerEvent::Ended { .. } => "ended",
            PlayerEvent::Error { .. } => "error",
            PlayerEvent::ChunkError { .. } => "chunk-error",
            PlayerEvent::ChunkLoaded { .. } => "chunk-loaded",
        }
    }
}

// ========================================
// EventBus Implementation
// ========================================

/// Central event distribution bus
///
/// Uses `tokio::broadcast` internally:
/// - Non-blocking publish (slow subscribers don't block the engine)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use lapstream_common::events::{EventBus, PlayerEvent, PlayerState};
///
/// let event_bus = EventBus::new(16);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(PlayerEvent::StateChanged {
///     old_state: PlayerState::Idle,
///     new_state: PlayerState::Loading,
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert!(matches!(rx.try_recv(), Ok(PlayerEvent::StateChanged { .. })));
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PlayerEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with the given channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: PlayerEvent,
    ) -> Result<usize, broadcast::error::SendError<PlayerEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: PlayerEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_wire_tag() {
        let event = PlayerEvent::ChunkError {
            chunk_index: 7,
            error: "empty body".to_string(),
            timestamp: chrono::Utc::now(),
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "chunk-error");
        assert_eq!(json["chunk_index"], 7);
        assert_eq!(event.event_type(), "chunk-error");
    }

    #[test]
    fn test_state_change_round_trips_through_json() {
        let event = PlayerEvent::StateChanged {
            old_state: PlayerState::Seeking,
            new_state: PlayerState::Paused,
            timestamp: chrono::Utc::now(),
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"statechange\""));
        assert!(json.contains("\"new_state\":\"paused\""));

        let parsed: PlayerEvent = serde_json::from_str(&json).unwrap();
        match parsed {
            PlayerEvent::StateChanged { old_state, new_state, .. } => {
                assert_eq!(old_state, PlayerState::Seeking);
                assert_eq!(new_state, PlayerState::Paused);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_player_state_display_and_activity() {
        assert_eq!(PlayerState::Buffering.to_string(), "buffering");
        assert!(PlayerState::Playing.is_active());
        assert!(PlayerState::Buffering.is_active());
        assert!(!PlayerState::Paused.is_active());
        assert!(!PlayerState::Error.is_active());
    }

    #[tokio::test]
    async fn test_event_bus_fan_out() {
        let bus = EventBus::new(8);
        assert!(bus.emit(PlayerEvent::Error {
            message: "nobody listening".to_string(),
            timestamp: chrono::Utc::now(),
        })
        .is_err());

        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        bus.emit_lossy(PlayerEvent::Ended {
            track_id: "t1".to_string(),
            timestamp: chrono::Utc::now(),
        });

        assert_eq!(rx1.recv().await.unwrap().event_type(), "ended");
        assert_eq!(rx2.recv().await.unwrap().event_type(), "ended");
        assert_eq!(bus.capacity(), 8);
    }
}
