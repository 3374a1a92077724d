//! Fixed-capacity TTL cache
//!
//! An owned component, not a global: holders construct one and thread it
//! through explicitly. Capacity is bounded; inserting into a full cache
//! prunes expired entries first, then evicts the least recently used one.
//! A single mutex guards the map, which is fine at the low traffic this
//! sees (health probe results, catalog lookups).

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;
use std::time::{Duration, Instant};

const MAX_CAPACITY: usize = 100;
const MAX_TTL: Duration = Duration::from_secs(60);

struct Entry<V> {
    value: V,
    inserted_at: Instant,
    last_used: Instant,
}

pub struct TtlCache<K, V> {
    entries: Mutex<HashMap<K, Entry<V>>>,
    capacity: usize,
    ttl: Duration,
}

impl<K: Eq + Hash + Clone, V: Clone> TtlCache<K, V> {
    /// Capacity is clamped to 100 entries and TTL to 60 seconds.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            capacity: capacity.clamp(1, MAX_CAPACITY),
            ttl: ttl.min(MAX_TTL),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let mut entries = self.entries.lock().expect("ttl cache poisoned");
        let now = Instant::now();
        match entries.get_mut(key) {
            Some(entry) if now.duration_since(entry.inserted_at) <= self.ttl => {
                entry.last_used = now;
                Some(entry.value.clone())
            }
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, key: K, value: V) {
        let mut entries = self.entries.lock().expect("ttl cache poisoned");
        let now = Instant::now();

        if entries.len() >= self.capacity && !entries.contains_key(&key) {
            entries.retain(|_, e| now.duration_since(e.inserted_at) <= self.ttl);
            if entries.len() >= self.capacity {
                // Still full after pruning: evict the least recently used entry
                if let Some(lru) = entries
                    .iter()
                    .min_by_key(|(_, e)| e.last_used)
                    .map(|(k, _)| k.clone())
                {
                    entries.remove(&lru);
                }
            }
        }

        entries.insert(
            key,
            Entry {
                value,
                inserted_at: now,
                last_used: now,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("ttl cache poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
