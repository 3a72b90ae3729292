#![cfg(test)]

use super::*;
use crate::caching::CacheEventKind;

#[test]
fn overflow_evicts_exactly_the_oldest_entry() {
    let mut cache = BoundedCache::new("test", 3);
    for key in 0..4u32 {
        cache.put(key, key * 10);
    }

    assert_eq!(cache.len(), 3);
    assert!(!cache.contains(&0));
    for key in 1..4u32 {
        assert!(cache.contains(&key), "key {key} should survive");
    }
    let metrics = cache.metrics();
    assert_eq!(metrics.evictions, 1);
    assert!(metrics.is_full());
    assert_eq!(metrics.latest.map(|event| event.to_string()), Some("evicted 0".to_string()));
}

#[test]
fn get_protects_entry_from_next_eviction() {
    let mut cache = BoundedCache::new("test", 3);
    cache.put("a", 1);
    cache.put("b", 2);
    cache.put("c", 3);

    assert_eq!(cache.get(&"a"), Some(1));
    cache.put("d", 4);

    assert!(cache.contains(&"a"));
    assert!(!cache.contains(&"b"));
    assert!(cache.contains(&"c"));
    assert!(cache.contains(&"d"));
}

#[test]
fn reinserting_refreshes_recency_and_value() {
    let mut cache = BoundedCache::new("test", 2);
    cache.put("a", 1);
    cache.put("b", 2);
    cache.put("a", 10);
    cache.put("c", 3);

    assert_eq!(cache.len(), 2);
    assert!(!cache.contains(&"b"));
    assert_eq!(cache.get(&"a"), Some(10));
}

#[test]
fn capacity_never_changes_under_pressure() {
    let mut cache = BoundedCache::new("test", 80);
    for key in 0..1_000usize {
        cache.put(key, ());
        assert!(cache.len() <= 80);
    }
    assert_eq!(cache.capacity(), 80);
    assert_eq!(cache.len(), 80);
    assert!((920..1_000).all(|key| cache.contains(&key)));
}

#[test]
fn counters_track_hits_misses_and_clears() {
    let mut cache = BoundedCache::new("decoded", 4);
    cache.put(1u8, "one");
    assert_eq!(cache.get(&1), Some("one"));
    assert_eq!(cache.get(&2), None);

    let metrics = cache.metrics();
    assert_eq!(metrics.hits, 1);
    assert_eq!(metrics.misses, 1);
    assert_eq!(metrics.hit_rate(), Some(0.5));
    assert_eq!(metrics.most_reused, Some(1));
    assert_eq!(metrics.latest.map(|event| event.to_string()), Some("miss".to_string()));

    assert_eq!(cache.clear(), 1);
    assert!(cache.is_empty());
    let metrics = cache.metrics();
    assert_eq!((metrics.evictions, metrics.cleared), (0, 1));
    assert_eq!(metrics.latest.map(|event| event.kind), Some(CacheEventKind::Cleared));
}

#[test]
fn zero_capacity_is_raised_to_one() {
    let mut cache = BoundedCache::new("tiny", 0);
    cache.put(1, 1);
    cache.put(2, 2);
    assert_eq!(cache.capacity(), 1);
    assert!(cache.contains(&2));
    assert!(!cache.contains(&1));
}
