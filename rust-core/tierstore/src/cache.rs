// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Write-through record cache.
//
// A map keyed exactly like the backend, with recency tracking for eviction.
// Recency is a per-cache logical clock bumped on every read and write, so
// two entries never share a `last_accessed` value and pruning is
// deterministic. Evicting an entry never touches backend data.

use std::collections::HashMap;

use serde_json::Value;

/// One cached record.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    /// The cached value.
    pub value: Value,
    /// Logical time of the last read or write.
    pub last_accessed: u64,
}

/// Bounded-on-demand recency cache.
#[derive(Debug, Default)]
pub struct RecordCache {
    entries: HashMap<String, CacheEntry>,
    clock: u64,
    capacity: Option<usize>,
}

impl RecordCache {
    /// An unbounded, empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// Look up `key`, refreshing its recency on a hit.
    pub fn get(&mut self, key: &str) -> Option<Value> {
        let now = self.tick();
        self.entries.get_mut(key).map(|entry| {
            entry.last_accessed = now;
            entry.value.clone()
        })
    }

    /// Whether `key` is cached, without touching its recency.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Insert or replace `key`, evicting the least recently used entries if
    /// a capacity is set and would be exceeded.
    pub fn insert(&mut self, key: &str, value: Value) {
        let now = self.tick();
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                last_accessed: now,
            },
        );
        if let Some(capacity) = self.capacity {
            while self.entries.len() > capacity {
                if self.evict_least_recent().is_none() {
                    break;
                }
            }
        }
    }

    /// Drop `key`. Returns whether it was cached.
    pub fn remove(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Current bound, if any.
    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Set or lift the bound. Lowering it evicts immediately.
    pub fn set_capacity(&mut self, capacity: Option<usize>) {
        self.capacity = capacity;
        if let Some(capacity) = capacity {
            self.retain_most_recent(capacity);
        }
    }

    /// Keep only the `n` most recently accessed entries. Returns how many
    /// were evicted.
    pub fn retain_most_recent(&mut self, n: usize) -> usize {
        if self.entries.len() <= n {
            return 0;
        }
        if n == 0 {
            let evicted = self.entries.len();
            self.entries.clear();
            return evicted;
        }
        let mut stamps: Vec<u64> = self.entries.values().map(|e| e.last_accessed).collect();
        stamps.sort_unstable_by(|a, b| b.cmp(a));
        // Stamps are unique, so exactly `n` entries are at or above the cutoff.
        let cutoff = stamps[n - 1];
        let before = self.entries.len();
        self.entries.retain(|_, e| e.last_accessed >= cutoff);
        before - self.entries.len()
    }

    fn evict_least_recent(&mut self) -> Option<String> {
        let key = self
            .entries
            .iter()
            .min_by_key(|(_, e)| e.last_accessed)
            .map(|(k, _)| k.clone())?;
        self.entries.remove(&key);
        Some(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_insert_get_remove() {
        let mut cache = RecordCache::new();
        assert_eq!(cache.get("a"), None);

        cache.insert("a", json!({"v": 1}));
        assert_eq!(cache.get("a"), Some(json!({"v": 1})));
        assert!(cache.contains("a"));
        assert_eq!(cache.len(), 1);

        assert!(cache.remove("a"));
        assert!(!cache.remove("a"));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_unbounded_by_default() {
        let mut cache = RecordCache::new();
        for i in 0..1000 {
            cache.insert(&format!("k{i}"), json!(i));
        }
        assert_eq!(cache.len(), 1000);
        assert_eq!(cache.capacity(), None);
    }

    #[test]
    fn test_capacity_evicts_least_recent() {
        let mut cache = RecordCache::new();
        cache.set_capacity(Some(2));

        cache.insert("a", json!(1));
        cache.insert("b", json!(2));
        // Touch "a" so "b" becomes the eviction candidate.
        cache.get("a");
        cache.insert("c", json!(3));

        assert_eq!(cache.len(), 2);
        assert!(cache.contains("a"));
        assert!(!cache.contains("b"));
        assert!(cache.contains("c"));
    }

    #[test]
    fn test_retain_most_recent_keeps_top_n() {
        let mut cache = RecordCache::new();
        for i in 0..30 {
            cache.insert(&format!("k{i}"), json!(i));
        }
        // Refresh two old entries.
        cache.get("k0");
        cache.get("k1");

        let evicted = cache.retain_most_recent(20);
        assert_eq!(evicted, 10);
        assert_eq!(cache.len(), 20);
        assert!(cache.contains("k0"));
        assert!(cache.contains("k1"));
        assert!(cache.contains("k29"));
        assert!(!cache.contains("k2"));
        assert!(!cache.contains("k11"));
        assert!(cache.contains("k12"));
    }

    #[test]
    fn test_retain_zero_and_noop_cases() {
        let mut cache = RecordCache::new();
        cache.insert("a", json!(1));
        assert_eq!(cache.retain_most_recent(5), 0);
        assert_eq!(cache.retain_most_recent(0), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_lowering_capacity_prunes() {
        let mut cache = RecordCache::new();
        for i in 0..10 {
            cache.insert(&format!("k{i}"), json!(i));
        }
        cache.set_capacity(Some(3));
        assert_eq!(cache.len(), 3);
        assert!(cache.contains("k9"));

        cache.set_capacity(None);
        for i in 10..20 {
            cache.insert(&format!("k{i}"), json!(i));
        }
        assert_eq!(cache.len(), 13);
    }
}
