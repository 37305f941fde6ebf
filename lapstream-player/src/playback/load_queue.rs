//! Priority load queue
//!
//! Orders pending chunk loads by priority, then by recency (most recently
//! enqueued first within a priority). Holds at most one entry per chunk index,
//! and tracks the indices whose fetch+decode is currently in flight.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use tokio::time::Instant;

use super::types::ChunkPriority;

/// Ordering key: priority first, then newest sequence number first
type QueueKey = (ChunkPriority, Reverse<u64>);

/// One pending load
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadQueueEntry {
    pub chunk_index: usize,
    pub priority: ChunkPriority,
    pub enqueued_at: Instant,
}

/// Outcome of an `enqueue`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// No previous entry for the index
    Inserted,
    /// Existing entry took the new (more urgent or equal) priority
    Replaced,
    /// Existing entry was more urgent; only its recency was refreshed
    Refreshed,
}

#[derive(Debug, Default)]
pub struct PriorityLoadQueue {
    ordered: BTreeMap<QueueKey, LoadQueueEntry>,
    by_index: HashMap<usize, QueueKey>,
    active_loads: BTreeSet<usize>,
    next_seq: u64,
}

impl PriorityLoadQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or re-prioritize a chunk load.
    ///
    /// Re-enqueueing an index removes its old entry. The new entry keeps the
    /// more urgent of the old and new priorities and always takes fresh
    /// recency, so a repeated low-priority prefetch never demotes a chunk that
    /// playback is already waiting on.
    pub fn enqueue(&mut self, chunk_index: usize, priority: ChunkPriority) -> EnqueueOutcome {
        let (priority, outcome) = match self.remove(chunk_index) {
            None => (priority, EnqueueOutcome::Inserted),
            Some(old) if priority <= old.priority => (priority, EnqueueOutcome::Replaced),
            Some(old) => (old.priority, EnqueueOutcome::Refreshed),
        };

        let seq = self.next_seq;
        self.next_seq += 1;

        let key = (priority, Reverse(seq));
        self.ordered.insert(
            key,
            LoadQueueEntry {
                chunk_index,
                priority,
                enqueued_at: Instant::now(),
            },
        );
        self.by_index.insert(chunk_index, key);
        outcome
    }

    /// Take the most urgent entry
    pub fn pop(&mut self) -> Option<LoadQueueEntry> {
        let (_, entry) = self.ordered.pop_first()?;
        self.by_index.remove(&entry.chunk_index);
        Some(entry)
    }

    pub fn remove(&mut self, chunk_index: usize) -> Option<LoadQueueEntry> {
        let key = self.by_index.remove(&chunk_index)?;
        self.ordered.remove(&key)
    }

    pub fn contains(&self, chunk_index: usize) -> bool {
        self.by_index.contains_key(&chunk_index)
    }

    pub fn priority_of(&self, chunk_index: usize) -> Option<ChunkPriority> {
        self.by_index.get(&chunk_index).map(|(priority, _)| *priority)
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    /// Pending entries in drain order
    pub fn entries(&self) -> Vec<LoadQueueEntry> {
        self.ordered.values().copied().collect()
    }

    /// Drop all pending entries (in-flight loads are unaffected)
    pub fn clear(&mut self) {
        self.ordered.clear();
        self.by_index.clear();
    }

    /// Record that a load for `chunk_index` is in flight; false if it already was
    pub fn start_load(&mut self, chunk_index: usize) -> bool {
        self.active_loads.insert(chunk_index)
    }

    pub fn finish_load(&mut self, chunk_index: usize) {
        self.active_loads.remove(&chunk_index);
    }

    pub fn is_active(&self, chunk_index: usize) -> bool {
        self.active_loads.contains(&chunk_index)
    }

    /// In-flight chunk indices, ascending
    pub fn active_loads(&self) -> Vec<usize> {
        self.active_loads.iter().copied().collect()
    }

    /// Forget in-flight loads (their results will be discarded by the caller)
    pub fn clear_active(&mut self) {
        self.active_loads.clear();
    }
}
