use std::{collections::hash_map::Entry, fmt::Debug, hash::Hash, time::Instant};

use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use super::metrics::{CacheEvent, CacheEventKind, CacheMetrics};

struct Slot<V> {
    value: V,
    inserted_at: Instant,
    /// Access tick of the last `get` hit or `put`.
    last_access: u64,
    hits: u64,
}

/// Fixed-capacity map with least-recently-used eviction.
///
/// Both `get` hits and `put` refresh recency. Once an insert pushes the size past
/// `capacity`, exactly one entry (the least recently touched) is dropped.
/// Recency is a per-cache counter, so two accesses within one clock tick still
/// order correctly.
pub struct BoundedCache<K, V> {
    name: &'static str,
    capacity: usize,
    slots: FxHashMap<K, Slot<V>>,
    clock: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
    cleared: u64,
    last_event: Option<CacheEvent>,
}

impl<K, V> BoundedCache<K, V>
where
    K: Hash + Eq + Clone + Debug,
    V: Clone,
{
    /// A capacity of zero is raised to one.
    pub fn new(name: &'static str, capacity: usize) -> Self {
        Self {
            name,
            capacity: capacity.max(1),
            slots: FxHashMap::default(),
            clock: 0,
            hits: 0,
            misses: 0,
            evictions: 0,
            cleared: 0,
            last_event: None,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Membership test that does not count as an access.
    pub fn contains(&self, key: &K) -> bool {
        self.slots.contains_key(key)
    }

    pub fn get(&mut self, key: &K) -> Option<V> {
        self.clock += 1;
        let Some(slot) = self.slots.get_mut(key) else {
            self.misses += 1;
            self.note(CacheEventKind::Miss, String::new());
            trace!(cache = self.name, ?key, "cache miss");
            return None;
        };
        slot.last_access = self.clock;
        slot.hits += 1;
        let value = slot.value.clone();
        self.hits += 1;
        self.note(CacheEventKind::Hit, String::new());
        trace!(cache = self.name, ?key, "cache hit");
        Some(value)
    }

    pub fn put(&mut self, key: K, value: V) {
        self.clock += 1;
        match self.slots.entry(key) {
            Entry::Occupied(mut occupied) => {
                let slot = occupied.get_mut();
                slot.value = value;
                slot.last_access = self.clock;
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Slot {
                    value,
                    inserted_at: Instant::now(),
                    last_access: self.clock,
                    hits: 0,
                });
            }
        }

        if self.slots.len() > self.capacity {
            self.evict_least_recent();
        }
    }

    /// Drop every entry, returning how many were held.
    pub fn clear(&mut self) -> usize {
        let dropped = self.slots.len();
        self.slots.clear();
        self.cleared += dropped as u64;
        self.note(CacheEventKind::Cleared, String::new());
        dropped
    }

    pub fn metrics(&self) -> CacheMetrics {
        let now = Instant::now();
        CacheMetrics {
            cache: self.name,
            entries: self.slots.len(),
            capacity: self.capacity,
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
            cleared: self.cleared,
            latest: self.last_event.clone(),
            oldest_age: self.slots.values().map(|slot| now.saturating_duration_since(slot.inserted_at)).max(),
            most_reused: self.slots.values().map(|slot| slot.hits).max(),
        }
    }

    fn note(&mut self, kind: CacheEventKind, subject: String) {
        self.last_event = Some(CacheEvent { kind, subject });
    }

    fn evict_least_recent(&mut self) {
        let Some(victim) = self
            .slots
            .iter()
            .min_by_key(|(_, slot)| slot.last_access)
            .map(|(key, _)| key.clone())
        else {
            return;
        };
        self.slots.remove(&victim);
        self.evictions += 1;
        self.note(CacheEventKind::Evicted, format!("{victim:?}"));
        debug!(cache = self.name, key = ?victim, capacity = self.capacity, "evicted least recently used entry");
    }
}

impl<K, V> Debug for BoundedCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedCache")
            .field("name", &self.name)
            .field("len", &self.slots.len())
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "bounded.test.rs"]
mod tests;
