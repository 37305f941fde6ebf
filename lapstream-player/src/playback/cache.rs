//! Decoded buffer cache
//!
//! Bounded `CacheKey -> PcmBuffer` store. When full, the oldest *inserted*
//! entry is evicted; reads do not refresh an entry's position.
//!
//! The processing identity `(enhanced, preset)` is part of the key: the same
//! chunk index decodes to different samples under a different preset.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tracing::debug;

use crate::audio::PcmBuffer;
use crate::stream::ProcessingProfile;

/// Identity of one decoded chunk
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub track_id: String,
    pub chunk_index: usize,
    pub enhanced: bool,
    pub preset: Option<String>,
}

impl CacheKey {
    pub fn new(track_id: &str, chunk_index: usize, profile: &ProcessingProfile) -> Self {
        Self {
            track_id: track_id.to_string(),
            chunk_index,
            enhanced: profile.enhanced,
            preset: profile.preset.clone(),
        }
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}#{}[{}:{}]",
            self.track_id,
            self.chunk_index,
            if self.enhanced { "enh" } else { "raw" },
            self.preset.as_deref().unwrap_or("-")
        )
    }
}

/// Bounded FIFO cache of decoded chunk buffers
#[derive(Debug)]
pub struct DecodedBufferCache {
    entries: HashMap<CacheKey, Arc<PcmBuffer>>,
    /// Keys in insertion order, oldest first
    order: VecDeque<CacheKey>,
    capacity: usize,
}

impl DecodedBufferCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<Arc<PcmBuffer>> {
        self.entries.get(key).cloned()
    }

    /// Insert a buffer, evicting the oldest insertion if at capacity.
    ///
    /// Replacing an existing key keeps its original insertion position.
    pub fn put(&mut self, key: CacheKey, buffer: Arc<PcmBuffer>) {
        if let Some(existing) = self.entries.get_mut(&key) {
            *existing = buffer;
            return;
        }

        while self.entries.len() >= self.capacity {
            match self.order.pop_front() {
                Some(oldest) => {
                    debug!("Cache full, evicting {}", oldest);
                    self.entries.remove(&oldest);
                }
                None => break,
            }
        }

        self.order.push_back(key.clone());
        self.entries.insert(key, buffer);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Keys in insertion order, oldest first
    pub fn keys(&self) -> Vec<CacheKey> {
        self.order.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(value: f32) -> Arc<PcmBuffer> {
        Arc::new(PcmBuffer::new(vec![value; 8], 8_000, 1))
    }

    fn key(index: usize, preset: Option<&str>) -> CacheKey {
        CacheKey::new("t1", index, &ProcessingProfile::new(preset.is_some(), preset.map(String::from)))
    }

    #[test]
    fn test_preset_is_part_of_identity() {
        let mut cache = DecodedBufferCache::new(10);
        cache.put(key(3, Some("warm")), buffer(0.1));
        cache.put(key(3, Some("bright")), buffer(0.2));

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&key(3, Some("warm"))).unwrap().samples[0], 0.1);
        assert_eq!(cache.get(&key(3, Some("bright"))).unwrap().samples[0], 0.2);
        assert!(cache.get(&key(3, None)).is_none());

        cache.clear();
        assert!(cache.get(&key(3, Some("warm"))).is_none());
        assert!(cache.get(&key(3, Some("bright"))).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_intensity_not_in_key() {
        let a = ProcessingProfile {
            enhanced: true,
            preset: Some("warm".to_string()),
            intensity: 0.1,
        };
        let b = ProcessingProfile { intensity: 0.9, ..a.clone() };
        assert_eq!(CacheKey::new("t", 1, &a), CacheKey::new("t", 1, &b));
    }

    #[test]
    fn test_evicts_oldest_insertion_not_least_recently_read() {
        let mut cache = DecodedBufferCache::new(3);
        cache.put(key(0, None), buffer(0.0));
        cache.put(key(1, None), buffer(0.1));
        cache.put(key(2, None), buffer(0.2));

        // Reading chunk 0 does not protect it
        assert!(cache.get(&key(0, None)).is_some());

        cache.put(key(3, None), buffer(0.3));
        assert!(!cache.contains(&key(0, None)));
        assert!(cache.contains(&key(1, None)));
        assert_eq!(cache.len(), 3);
        assert_eq!(
            cache.keys().iter().map(|k| k.chunk_index).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn test_replace_existing_key_does_not_evict() {
        let mut cache = DecodedBufferCache::new(2);
        cache.put(key(0, None), buffer(0.0));
        cache.put(key(1, None), buffer(0.1));
        cache.put(key(0, None), buffer(0.5));

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&key(0, None)).unwrap().samples[0], 0.5);
        assert!(cache.contains(&key(1, None)));
    }

    #[test]
    fn test_zero_capacity_is_raised_to_one() {
        let mut cache = DecodedBufferCache::new(0);
        assert_eq!(cache.capacity(), 1);
        cache.put(key(0, None), buffer(0.0));
        cache.put(key(1, None), buffer(0.1));
        assert_eq!(cache.len(), 1);
        assert!(cache.contains(&key(1, None)));
    }
}
