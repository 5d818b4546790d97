//! Memory-bounded LRU cache of decoded raster chunks.
//!
//! Neighbouring point selections read overlapping windows, so decoded chunks
//! are kept and shared between the climate scenes and the land cover raster.
//! Chunks are stored as `f32` whatever the array's data type; land cover
//! codes are exact in `f32`.

use std::sync::Arc;

use lru::LruCache;

use crate::types::CacheStats;

/// Identifies one chunk of one array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkKey {
    /// Hash of the array's store location, see [`hash_path`].
    pub array: u64,
    pub chunk_row: u64,
    pub chunk_col: u64,
}

impl ChunkKey {
    pub fn new(array: u64, chunk_row: u64, chunk_col: u64) -> Self {
        Self {
            array,
            chunk_row,
            chunk_col,
        }
    }
}

/// LRU cache for decoded chunks with memory-bounded eviction.
pub struct ChunkCache {
    cache: LruCache<ChunkKey, Arc<Vec<f32>>>,
    memory_limit: usize,
    current_memory: usize,
    stats: CacheStats,
}

fn chunk_bytes(data: &[f32]) -> usize {
    std::mem::size_of_val(data)
}

impl ChunkCache {
    /// Create a new chunk cache with the given memory limit in bytes.
    pub fn new(memory_limit: usize) -> Self {
        Self {
            // Entry count is bounded by memory, not by the LRU capacity.
            cache: LruCache::unbounded(),
            memory_limit,
            current_memory: 0,
            stats: CacheStats::default(),
        }
    }

    /// Look up a chunk, updating its recency.
    pub fn get(&mut self, key: &ChunkKey) -> Option<Arc<Vec<f32>>> {
        match self.cache.get(key) {
            Some(data) => {
                self.stats.hits += 1;
                Some(Arc::clone(data))
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    /// Insert a chunk, evicting least recently used chunks to make room.
    ///
    /// Chunks larger than the whole budget are not cached.
    pub fn insert(&mut self, key: ChunkKey, data: Arc<Vec<f32>>) {
        let size = chunk_bytes(&data);
        if size > self.memory_limit {
            return;
        }

        if let Some(previous) = self.cache.pop(&key) {
            self.current_memory = self.current_memory.saturating_sub(chunk_bytes(&previous));
        }

        while self.current_memory + size > self.memory_limit {
            match self.cache.pop_lru() {
                Some((_, evicted)) => {
                    self.current_memory = self.current_memory.saturating_sub(chunk_bytes(&evicted));
                    self.stats.evictions += 1;
                }
                None => break,
            }
        }

        self.cache.put(key, data);
        self.current_memory += size;
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.cache.len(),
            memory_bytes: self.current_memory as u64,
            ..self.stats
        }
    }

    /// Clear all entries from the cache.
    pub fn clear(&mut self) {
        self.cache.clear();
        self.current_memory = 0;
    }

    pub fn memory_usage(&self) -> usize {
        self.current_memory
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

impl Default for ChunkCache {
    fn default() -> Self {
        Self::new(64 * 1024 * 1024)
    }
}

/// Stable hash of an array location, used in cache keys.
pub fn hash_path(path: &str) -> u64 {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    path.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(value: f32, len: usize) -> Arc<Vec<f32>> {
        Arc::new(vec![value; len])
    }

    #[test]
    fn test_hit_and_miss_counting() {
        let mut cache = ChunkCache::new(1024);
        let key = ChunkKey::new(hash_path("tas/2001-07-01"), 0, 0);

        assert!(cache.get(&key).is_none());
        cache.insert(key, chunk(280.0, 4));
        assert_eq!(cache.get(&key).unwrap()[0], 280.0);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.memory_bytes, 16);
        assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_least_recently_used_is_evicted() {
        // Room for two 16-byte chunks.
        let mut cache = ChunkCache::new(32);
        let a = ChunkKey::new(1, 0, 0);
        let b = ChunkKey::new(1, 0, 1);
        let c = ChunkKey::new(1, 1, 0);

        cache.insert(a, chunk(1.0, 4));
        cache.insert(b, chunk(2.0, 4));
        // Touch a so b becomes the eviction candidate.
        cache.get(&a);
        cache.insert(c, chunk(3.0, 4));

        assert!(cache.get(&b).is_none());
        assert!(cache.get(&a).is_some());
        assert!(cache.get(&c).is_some());
        assert_eq!(cache.stats().evictions, 1);
        assert!(cache.memory_usage() <= 32);
    }

    #[test]
    fn test_oversized_chunk_is_skipped() {
        let mut cache = ChunkCache::new(8);
        cache.insert(ChunkKey::new(1, 0, 0), chunk(1.0, 4));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_reinsert_replaces_accounting() {
        let mut cache = ChunkCache::new(1024);
        let key = ChunkKey::new(7, 2, 3);
        cache.insert(key, chunk(1.0, 4));
        cache.insert(key, chunk(2.0, 8));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.memory_usage(), 32);

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.memory_usage(), 0);
    }

    #[test]
    fn test_hash_path() {
        assert_eq!(hash_path("tas/a"), hash_path("tas/a"));
        assert_ne!(hash_path("tas/a"), hash_path("tas/b"));
    }
}
