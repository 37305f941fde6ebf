//! Playback: load scheduling, caching, timeline math and the engine

pub mod cache;
pub mod engine;
pub mod load_queue;
pub mod loader;
pub mod timeline;
pub mod types;

pub use cache::{CacheKey, DecodedBufferCache};
pub use engine::{EngineDiagnostics, PlaybackEngine};
pub use load_queue::{LoadQueueEntry, PriorityLoadQueue};
pub use timeline::{plan_chunk, ChunkPlan, PlaybackClock};
pub use types::ChunkPriority;
