//! Per-layer LRU for lazily-loaded MoE expert weights (spec §4.9).
//!
//! The teacher never reaches for an LRU crate anywhere in its dependency
//! tree, so this is a small hand-rolled `HashMap` + monotonically
//! increasing access counter rather than an external crate.

use std::collections::HashMap;

pub struct ExpertCache<T> {
    capacity: usize,
    entries: HashMap<usize, (T, u64)>,
    clock: u64,
}

impl<T> ExpertCache<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::new(),
            clock: 0,
        }
    }

    pub fn get(&mut self, expert_idx: usize) -> Option<&T> {
        self.clock += 1;
        let clock = self.clock;
        if let Some(entry) = self.entries.get_mut(&expert_idx) {
            entry.1 = clock;
            Some(&entry.0)
        } else {
            None
        }
    }

    /// Insert a freshly-loaded expert, evicting the least-recently-used
    /// entry if at capacity.
    pub fn insert(&mut self, expert_idx: usize, value: T) {
        if self.entries.len() >= self.capacity && !self.entries.contains_key(&expert_idx) {
            if let Some((&lru_key, _)) = self.entries.iter().min_by_key(|(_, (_, last_used))| *last_used) {
                self.entries.remove(&lru_key);
            }
        }
        self.clock += 1;
        self.entries.insert(expert_idx, (value, self.clock));
    }

    pub fn contains(&self, expert_idx: usize) -> bool {
        self.entries.contains_key(&expert_idx)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounded_capacity_evicts_least_recently_used() {
        let mut cache: ExpertCache<u32> = ExpertCache::new(2);
        cache.insert(0, 100);
        cache.insert(1, 101);
        cache.get(0); // touch 0, making 1 the LRU
        cache.insert(2, 102); // should evict 1
        assert!(cache.contains(0));
        assert!(!cache.contains(1));
        assert!(cache.contains(2));
    }

    #[test]
    fn capacity_matches_num_experts_per_token_times_two_in_practice() {
        let num_experts_per_token = 2;
        let mut cache: ExpertCache<u32> = ExpertCache::new(num_experts_per_token * 2);
        for i in 0..4 {
            cache.insert(i, i as u32);
        }
        assert_eq!(cache.len(), 4);
        cache.insert(4, 4);
        assert_eq!(cache.len(), 4);
    }
}
