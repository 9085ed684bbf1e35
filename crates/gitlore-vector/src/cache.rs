//! Embedding cache keyed by (text, context type, model).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use serde::Serialize;
use sha2::{Digest, Sha256};

use gitlore_core::types::ContextType;

/// Hit/miss counters and current size of an [`EmbeddingCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

/// Process-lifetime embedding cache.
///
/// Entries are never evicted. Values are immutable once inserted:
/// `insert_if_absent` keeps the first vector stored under a key.
#[derive(Debug, Default)]
pub struct EmbeddingCache {
    entries: RwLock<HashMap<String, Vec<f32>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl EmbeddingCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hex sha256 over model, context type and text.
    pub fn key(text: &str, context_type: ContextType, model_id: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(model_id.as_bytes());
        hasher.update([0u8]);
        hasher.update(context_type.as_str().as_bytes());
        hasher.update([0u8]);
        hasher.update(text.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn get(&self, key: &str) -> Option<Vec<f32>> {
        let found = self
            .entries
            .read()
            .ok()
            .and_then(|entries| entries.get(key).cloned());
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    /// Store `value` unless the key is already present. Returns the vector
    /// now held under the key.
    pub fn insert_if_absent(&self, key: String, value: Vec<f32>) -> Vec<f32> {
        match self.entries.write() {
            Ok(mut entries) => entries.entry(key).or_insert(value).clone(),
            // A poisoned cache only loses memoization.
            Err(_) => value,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_depends_on_all_parts() {
        let base = EmbeddingCache::key("fix bug", ContextType::Commit, "m1");
        assert_eq!(base, EmbeddingCache::key("fix bug", ContextType::Commit, "m1"));
        assert_ne!(base, EmbeddingCache::key("fix bug", ContextType::Code, "m1"));
        assert_ne!(base, EmbeddingCache::key("fix bug", ContextType::Commit, "m2"));
        assert_ne!(base, EmbeddingCache::key("fix bugs", ContextType::Commit, "m1"));
        assert_eq!(base.len(), 64);
    }

    #[test]
    fn test_insert_if_absent_keeps_first_value() {
        let cache = EmbeddingCache::new();
        let first = cache.insert_if_absent("k".into(), vec![1.0, 2.0]);
        let second = cache.insert_if_absent("k".into(), vec![3.0, 4.0]);
        assert_eq!(first, vec![1.0, 2.0]);
        assert_eq!(second, vec![1.0, 2.0]);
        assert_eq!(cache.get("k"), Some(vec![1.0, 2.0]));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_stats_count_hits_and_misses() {
        let cache = EmbeddingCache::new();
        assert!(cache.get("missing").is_none());
        cache.insert_if_absent("k".into(), vec![0.5]);
        assert!(cache.get("k").is_some());
        assert!(cache.get("k").is_some());

        let stats = cache.stats();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
    }
}
