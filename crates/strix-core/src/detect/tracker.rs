//! Memory-bounded keyed tracker with scored eviction.
//!
//! Long-running ingestion sees unbounded key cardinality (client IPs,
//! endpoint paths). This tracker caps the map and evicts the entry with the
//! lowest retention score: recently-seen, busy entries survive.

use std::collections::HashMap;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Maximum number of tracked keys.
    pub max_entries: usize,
    /// Entries with fewer observations than this are not eviction
    /// candidates unless nothing else qualifies.
    pub min_events_for_eviction: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            min_events_for_eviction: 5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EntryMeta {
    pub last_access: Instant,
    pub event_count: u64,
}

impl Default for EntryMeta {
    fn default() -> Self {
        Self {
            last_access: Instant::now(),
            event_count: 0,
        }
    }
}

impl EntryMeta {
    fn touch(&mut self) {
        self.last_access = Instant::now();
        self.event_count += 1;
    }

    /// Retention score: recent access and many events keep an entry alive.
    fn retention_score(&self) -> f64 {
        let age_seconds = self.last_access.elapsed().as_secs_f64();
        let event_factor = (self.event_count as f64).ln().max(1.0);
        event_factor / (age_seconds + 1.0)
    }
}

struct Entry<V> {
    value: V,
    meta: EntryMeta,
}

pub struct BoundedTracker<V> {
    entries: HashMap<String, Entry<V>>,
    config: TrackerConfig,
    total_evictions: u64,
}

impl<V> BoundedTracker<V> {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            entries: HashMap::with_capacity(config.max_entries.min(4096)),
            config,
            total_evictions: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn evictions(&self) -> u64 {
        self.total_evictions
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.entries.get(key).map(|e| &e.value)
    }

    /// Fetch or create the entry for `key`, touching its access metadata and
    /// evicting one entry first if the map is at capacity.
    pub fn get_or_create<F>(&mut self, key: &str, create: F) -> &mut V
    where
        F: FnOnce() -> V,
    {
        if !self.entries.contains_key(key) && self.entries.len() >= self.config.max_entries {
            self.evict_one();
        }

        let entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry {
                value: create(),
                meta: EntryMeta::default(),
            });
        entry.meta.touch();
        &mut entry.value
    }

    fn evict_one(&mut self) {
        let candidate = self.find_eviction_candidate();
        if let Some(key) = candidate {
            self.entries.remove(&key);
            self.total_evictions += 1;
        }
    }

    fn find_eviction_candidate(&self) -> Option<String> {
        let mut best: Option<(&String, f64)> = None;

        for (key, entry) in &self.entries {
            if entry.meta.event_count < self.config.min_events_for_eviction {
                continue;
            }
            let score = entry.meta.retention_score();
            match best {
                None => best = Some((key, score)),
                Some((_, best_score)) if score < best_score => best = Some((key, score)),
                _ => {}
            }
        }

        // All entries still warming up: fall back to the stalest one.
        if best.is_none() {
            best = self
                .entries
                .iter()
                .min_by_key(|(_, e)| e.meta.last_access)
                .map(|(k, e)| (k, e.meta.retention_score()));
        }

        best.map(|(k, _)| k.clone())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &V)> {
        self.entries.iter().map(|(k, e)| (k, &e.value))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(max: usize) -> BoundedTracker<u32> {
        BoundedTracker::new(TrackerConfig {
            max_entries: max,
            min_events_for_eviction: 0,
        })
    }

    #[test]
    fn test_get_or_create() {
        let mut t = tracker(10);
        *t.get_or_create("a", || 1) = 5;
        assert_eq!(t.get("a"), Some(&5));
        // Second access keeps the stored value.
        assert_eq!(*t.get_or_create("a", || 99), 5);
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn test_capacity_is_enforced() {
        let mut t = tracker(3);
        for i in 0..10 {
            t.get_or_create(&format!("k{}", i), || i);
        }
        assert_eq!(t.len(), 3);
        assert!(t.evictions() >= 7);
    }

    #[test]
    fn test_busy_entries_survive() {
        let mut t = tracker(3);
        t.get_or_create("busy", || 0);
        for _ in 0..50 {
            t.get_or_create("busy", || 0);
        }
        t.get_or_create("idle1", || 1);
        t.get_or_create("idle2", || 2);
        // Force one eviction.
        t.get_or_create("new", || 3);
        assert!(t.contains("busy"));
    }

    #[test]
    fn test_clear() {
        let mut t = tracker(5);
        t.get_or_create("a", || 0);
        t.clear();
        assert!(t.is_empty());
    }
}
