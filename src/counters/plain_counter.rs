use crate::config::CounterConfig;
use crate::counters::Counter;
use crate::error::Result;
use crate::shard::{ShardedCountMap, ShardedMap};
use log::debug;
use std::collections::HashMap;

/// Counts raw occurrences of each hash.
#[derive(Debug, Default)]
pub struct PlainCounter {
    counts: ShardedCountMap,
}

impl PlainCounter {
    pub fn new() -> Self {
        PlainCounter {
            counts: ShardedMap::new(),
        }
    }

    pub fn with_config(config: &CounterConfig) -> Result<Self> {
        Ok(PlainCounter {
            counts: ShardedMap::with_config(config)?,
        })
    }

    /// Adds one occurrence per element of `hashes`. Safe to call from many
    /// threads at once.
    pub fn add_hashes(&self, hashes: &[u64]) {
        self.counts.apply_batch(
            hashes.iter().map(|&hash| (hash, ())),
            |()| 1,
            |count, ()| *count = count.saturating_add(1),
        );
    }

    /// Drops every hash seen exactly once and returns how many were dropped.
    pub fn remove_singletons(&self) -> u64 {
        let removed = self.counts.retain(|_, count| *count != 1) as u64;
        debug!("removed {} singleton hashes, {} left", removed, self.size());
        removed
    }

    /// Drops every hash whose count is below `min_abundance`.
    pub fn keep_min_abundance(&self, min_abundance: u32) {
        let removed = self.counts.retain(|_, count| *count >= min_abundance);
        debug!(
            "min abundance {} removed {} hashes, {} left",
            min_abundance,
            removed,
            self.size()
        );
    }

    pub fn get(&self, hash: u64) -> Option<u32> {
        self.counts.get(hash)
    }

    /// Sum of all occurrence counts.
    pub fn total_count(&self) -> u64 {
        let mut total = 0u64;
        self.counts.for_each(|_, &count| total += count as u64);
        total
    }

    pub fn clear(&self) {
        self.counts.clear();
    }
}

impl Counter for PlainCounter {
    type Count = u32;

    fn size(&self) -> u64 {
        self.counts.len() as u64
    }

    fn get_kmers(&self) -> HashMap<u64, u32> {
        self.counts.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_counts_across_batches() {
        let counter = PlainCounter::new();
        counter.add_hashes(&[1, 2, 2, 3, 3, 3]);
        counter.add_hashes(&[1]);

        let kmers = counter.get_kmers();
        assert_eq!(kmers, HashMap::from([(1, 2), (2, 2), (3, 3)]));
        assert_eq!(counter.size(), 3);
        assert_eq!(counter.total_count(), 7);
        assert_eq!(counter.remove_singletons(), 0);
        assert_eq!(counter.size(), 3);
    }

    #[test]
    fn test_remove_singletons() {
        let counter = PlainCounter::new();
        counter.add_hashes(&[5]);
        assert_eq!(counter.remove_singletons(), 1);
        assert!(counter.is_empty());
        assert_eq!(counter.get(5), None);

        counter.add_hashes(&[1, 1, 2, 3, 4, 4, 4]);
        assert_eq!(counter.remove_singletons(), 2);
        assert_eq!(counter.get_kmers(), HashMap::from([(1, 2), (4, 3)]));
        // Nothing left to remove.
        assert_eq!(counter.remove_singletons(), 0);
    }

    #[test]
    fn test_keep_min_abundance_is_idempotent() {
        let counter = PlainCounter::new();
        counter.add_hashes(&[1, 2, 2, 3, 3, 3, 4, 4, 4, 4]);
        counter.keep_min_abundance(3);
        let once = counter.get_kmers();
        assert_eq!(once, HashMap::from([(3, 3), (4, 4)]));
        counter.keep_min_abundance(3);
        assert_eq!(counter.get_kmers(), once);

        // Threshold 0 and 1 keep everything.
        counter.keep_min_abundance(0);
        counter.keep_min_abundance(1);
        assert_eq!(counter.get_kmers(), once);
    }

    #[test]
    fn test_clear_resets_counts() {
        let counter = PlainCounter::new();
        counter.add_hashes(&[1, 2, 2]);
        counter.clear();
        assert!(counter.is_empty());
        assert_eq!(counter.total_count(), 0);
        assert_eq!(counter.get(2), None);

        counter.add_hashes(&[2]);
        assert_eq!(counter.get_kmers(), HashMap::from([(2, 1)]));
    }

    #[test]
    fn test_empty_counter() {
        let counter = PlainCounter::new();
        counter.add_hashes(&[]);
        assert_eq!(counter.size(), 0);
        assert_eq!(counter.remove_singletons(), 0);
        counter.keep_min_abundance(10);
        assert!(counter.get_kmers().is_empty());
    }

    #[test]
    fn test_random_batches_match_reference() {
        let mut rng = SmallRng::seed_from_u64(42);
        let config = CounterConfig::default().with_shards(16);
        let counter = PlainCounter::with_config(&config).unwrap();
        let mut reference: HashMap<u64, u32> = HashMap::new();

        for _ in 0..20 {
            let batch: Vec<u64> = (0..500).map(|_| rng.random_range(0..2000)).collect();
            for &hash in &batch {
                *reference.entry(hash).or_insert(0) += 1;
            }
            counter.add_hashes(&batch);
        }

        assert_eq!(counter.size(), reference.len() as u64);
        assert_eq!(counter.get_kmers(), reference);

        let singletons = reference.values().filter(|&&c| c == 1).count() as u64;
        assert_eq!(counter.remove_singletons(), singletons);
        assert!(counter.get_kmers().values().all(|&c| c != 1));
    }
}
