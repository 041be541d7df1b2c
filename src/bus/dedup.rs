//! Bounded seen-set for idempotent event consumption.

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

/// Tracks recently seen event ids so at-least-once delivery collapses to
/// effectively-once processing. Capped; on overflow the oldest entries are
/// evicted in one coarse batch rather than per-insert.
pub struct DedupCache {
    capacity: usize,
    evict: usize,
    inner: Mutex<Inner>,
}

struct Inner {
    seen: HashSet<String>,
    order: VecDeque<String>,
}

impl DedupCache {
    pub fn new(capacity: usize, evict: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            evict: evict.max(1),
            inner: Mutex::new(Inner {
                seen: HashSet::new(),
                order: VecDeque::new(),
            }),
        }
    }

    /// Record an id. Returns `true` on first sight, `false` for a duplicate.
    pub fn insert(&self, id: &str) -> bool {
        let mut inner = self.inner.lock().expect("Mutex poisoned");

        if inner.seen.contains(id) {
            return false;
        }

        if inner.order.len() >= self.capacity {
            for _ in 0..self.evict.min(inner.order.len()) {
                if let Some(old) = inner.order.pop_front() {
                    inner.seen.remove(&old);
                }
            }
        }

        inner.seen.insert(id.to_string());
        inner.order.push_back(id.to_string());
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner.lock().expect("Mutex poisoned").seen.contains(id)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("Mutex poisoned").order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sight_then_duplicate() {
        let cache = DedupCache::new(10, 5);
        assert!(cache.insert("dup1"));
        assert!(!cache.insert("dup1"));
        assert!(cache.contains("dup1"));
    }

    #[test]
    fn overflow_evicts_oldest_batch() {
        let cache = DedupCache::new(10, 5);
        for i in 0..10 {
            assert!(cache.insert(&format!("e{i}")));
        }
        assert_eq!(cache.len(), 10);

        // Triggers eviction of the oldest 5 before inserting.
        assert!(cache.insert("e10"));
        assert_eq!(cache.len(), 6);
        assert!(!cache.contains("e0"));
        assert!(!cache.contains("e4"));
        assert!(cache.contains("e5"));
        assert!(cache.contains("e10"));

        // Evicted ids count as new again.
        assert!(cache.insert("e0"));
    }
}
