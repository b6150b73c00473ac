use crate::config::{CounterConfig, DEFAULT_SHARDS};
use crate::error::Result;
use rayon::prelude::*;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Mutex, MutexGuard, PoisonError};
use xxhash_rust::xxh64::{Xxh64Builder, xxh64};

// Routing uses its own seed so that the shard index and the in-shard bucket
// position are drawn from independent hashes.
const SHARD_SEED: u64 = 0x9e37_79b9_7f4a_7c15;

pub type ShardTable<V> = HashMap<u64, V, Xxh64Builder>;

/// Hash to occurrence count.
pub type ShardedCountMap = ShardedMap<u32>;

/// Hash to accumulated floating score.
pub type ShardedScoreMap = ShardedMap<f32>;

// 128-byte alignment keeps neighbouring locks off the same cache line.
#[repr(align(128))]
struct Shard<V> {
    table: Mutex<ShardTable<V>>,
}

impl<V> Shard<V> {
    fn new() -> Self {
        Shard {
            table: Mutex::new(ShardTable::default()),
        }
    }
}

/// A `u64`-keyed table split into a power-of-two number of shards, each
/// behind its own lock.
///
/// Point operations lock exactly one shard. Bulk operations (`len`,
/// `retain`, `snapshot`, `entries`, ...) visit the shards one at a time and
/// hold each lock only while visiting that shard, so they are not atomic
/// across the table: callers must not run them concurrently with writers
/// if they need a consistent view.
pub struct ShardedMap<V> {
    shards: Box<[Shard<V>]>,
    mask: u64,
}

impl<V> Default for ShardedMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> std::fmt::Debug for ShardedMap<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardedMap")
            .field("shards", &self.shard_count())
            .field("len", &self.len())
            .finish()
    }
}

impl<V> ShardedMap<V> {
    /// Creates an empty map with [`DEFAULT_SHARDS`] shards.
    pub fn new() -> Self {
        Self::build(DEFAULT_SHARDS)
    }

    /// Creates an empty map with the shard count of `config`.
    pub fn with_config(config: &CounterConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config.shards))
    }

    fn build(num_shards: usize) -> Self {
        let shards: Vec<Shard<V>> = (0..num_shards).map(|_| Shard::new()).collect();
        ShardedMap {
            shards: shards.into_boxed_slice(),
            mask: num_shards as u64 - 1,
        }
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    #[inline(always)]
    pub fn shard_index(&self, key: u64) -> usize {
        (xxh64(&key.to_le_bytes(), SHARD_SEED) & self.mask) as usize
    }

    // Poisoned shards stay usable: every update is a single in-place step.
    #[inline(always)]
    fn lock(&self, idx: usize) -> MutexGuard<'_, ShardTable<V>> {
        self.shards[idx]
            .table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert(&self, key: u64, value: V) -> Option<V> {
        self.lock(self.shard_index(key)).insert(key, value)
    }

    /// Updates the value of `key` in place, or inserts `insert()` if absent.
    pub fn upsert<I, U>(&self, key: u64, insert: I, update: U)
    where
        I: FnOnce() -> V,
        U: FnOnce(&mut V),
    {
        let mut table = self.lock(self.shard_index(key));
        match table.entry(key) {
            Entry::Occupied(mut entry) => update(entry.get_mut()),
            Entry::Vacant(entry) => {
                entry.insert(insert());
            }
        }
    }

    pub fn remove(&self, key: u64) -> Option<V> {
        self.lock(self.shard_index(key)).remove(&key)
    }

    pub fn contains_key(&self, key: u64) -> bool {
        self.lock(self.shard_index(key)).contains_key(&key)
    }

    pub fn get(&self, key: u64) -> Option<V>
    where
        V: Clone,
    {
        self.lock(self.shard_index(key)).get(&key).cloned()
    }

    pub fn len(&self) -> usize {
        (0..self.shard_count()).map(|idx| self.lock(idx).len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        (0..self.shard_count()).all(|idx| self.lock(idx).is_empty())
    }

    pub fn clear(&self) {
        for idx in 0..self.shard_count() {
            self.lock(idx).clear();
        }
    }

    /// Splits `items` into one bucket per shard, preserving input order
    /// within each bucket.
    pub fn partition<T>(
        &self,
        items: impl IntoIterator<Item = (u64, T)>,
    ) -> Vec<Vec<(u64, T)>> {
        let mut buckets: Vec<Vec<(u64, T)>> =
            (0..self.shard_count()).map(|_| Vec::new()).collect();
        for (key, item) in items {
            buckets[self.shard_index(key)].push((key, item));
        }
        buckets
    }

    /// Applies a whole batch, locking each touched shard once.
    ///
    /// For every `(key, item)`, absent keys get `insert(item)` and present
    /// keys get `update(&mut value, item)`.
    pub fn apply_batch<T, I, U>(
        &self,
        items: impl IntoIterator<Item = (u64, T)>,
        insert: I,
        update: U,
    ) where
        I: Fn(T) -> V,
        U: Fn(&mut V, T),
    {
        for (idx, bucket) in self.partition(items).into_iter().enumerate() {
            if bucket.is_empty() {
                continue;
            }
            let mut table = self.lock(idx);
            for (key, item) in bucket {
                match table.entry(key) {
                    Entry::Occupied(mut entry) => update(entry.get_mut(), item),
                    Entry::Vacant(entry) => {
                        entry.insert(insert(item));
                    }
                }
            }
        }
    }

    /// Keeps only the entries for which `keep` returns `true` and returns
    /// how many were removed. Shards are filtered in parallel.
    pub fn retain<F>(&self, keep: F) -> usize
    where
        F: Fn(u64, &mut V) -> bool + Sync,
        V: Send,
    {
        self.shards
            .par_iter()
            .map(|shard| {
                let mut table = shard.table.lock().unwrap_or_else(PoisonError::into_inner);
                let before = table.len();
                table.retain(|&key, value| keep(key, value));
                before - table.len()
            })
            .sum()
    }

    /// Visits every entry, shard by shard.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(u64, &V),
    {
        for idx in 0..self.shard_count() {
            for (&key, value) in self.lock(idx).iter() {
                f(key, value);
            }
        }
    }

    /// Copies the whole table into a plain `HashMap`.
    pub fn snapshot(&self) -> HashMap<u64, V>
    where
        V: Clone,
    {
        let mut out = HashMap::with_capacity(self.len());
        self.for_each(|key, value| {
            out.insert(key, value.clone());
        });
        out
    }

    /// Copies the whole table into a vector.
    ///
    /// The order is shard order, then table order inside each shard. It is
    /// stable across calls as long as the map is not mutated in between.
    pub fn entries(&self) -> Vec<(u64, V)>
    where
        V: Clone,
    {
        let mut out = Vec::with_capacity(self.len());
        self.for_each(|key, value| out.push((key, value.clone())));
        out
    }

    /// Empties shard `idx` and hands its contents to the caller.
    pub(crate) fn take_shard(&self, idx: usize) -> ShardTable<V> {
        std::mem::take(&mut *self.lock(idx))
    }

    /// Merges `items` into shard `idx` under one lock. Present keys get
    /// `merge(&mut value, item)`. Every key must route to `idx`.
    pub(crate) fn extend_shard<F>(
        &self,
        idx: usize,
        items: impl IntoIterator<Item = (u64, V)>,
        merge: F,
    ) where
        F: Fn(&mut V, V),
    {
        let mut table = self.lock(idx);
        for (key, value) in items {
            debug_assert_eq!(self.shard_index(key), idx);
            match table.entry(key) {
                Entry::Occupied(mut entry) => merge(entry.get_mut(), value),
                Entry::Vacant(entry) => {
                    entry.insert(value);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routing_is_stable_and_in_range() {
        let map: ShardedCountMap = ShardedMap::new();
        assert_eq!(map.shard_count(), 64);
        for key in 0..10_000u64 {
            let idx = map.shard_index(key);
            assert!(idx < 64);
            assert_eq!(idx, map.shard_index(key));
        }
    }

    #[test]
    fn test_routing_spreads_sequential_keys() {
        let map: ShardedCountMap = ShardedMap::new();
        let mut used = vec![false; map.shard_count()];
        for key in 0..4096u64 {
            used[map.shard_index(key)] = true;
        }
        assert!(used.iter().all(|&u| u));
    }

    #[test]
    fn test_point_operations() {
        let map: ShardedScoreMap = ShardedMap::new();
        assert!(map.is_empty());
        assert_eq!(map.insert(1, 0.5), None);
        map.upsert(1, || 0.0, |v| *v += 1.0);
        map.upsert(2, || 3.0, |v| *v += 1.0);
        assert_eq!(map.get(1), Some(1.5));
        assert_eq!(map.get(2), Some(3.0));
        assert!(map.contains_key(2));
        assert_eq!(map.remove(2), Some(3.0));
        assert!(!map.contains_key(2));
        assert_eq!(map.len(), 1);
        map.clear();
        assert!(map.is_empty());
    }

    #[test]
    fn test_apply_batch_matches_upsert() {
        let map: ShardedCountMap = ShardedMap::new();
        let keys = [5u64, 9, 5, 1 << 40, 9, 5];
        map.apply_batch(keys.iter().map(|&k| (k, 1u32)), |n| n, |v, n| *v += n);
        assert_eq!(map.get(5), Some(3));
        assert_eq!(map.get(9), Some(2));
        assert_eq!(map.get(1 << 40), Some(1));
        assert_eq!(map.len(), 3);
    }

    #[test]
    fn test_retain_reports_removed() {
        let map: ShardedCountMap = ShardedMap::new();
        for key in 0..1000u64 {
            map.insert(key, (key % 4) as u32);
        }
        let removed = map.retain(|_, count| *count >= 2);
        assert_eq!(removed, 500);
        assert_eq!(map.len(), 500);
        assert!(map.entries().iter().all(|&(_, count)| count >= 2));
    }

    #[test]
    fn test_entries_order_is_stable() {
        let map: ShardedCountMap = ShardedMap::new();
        for key in 0..500u64 {
            map.insert(key * 7919, key as u32);
        }
        assert_eq!(map.entries(), map.entries());
        assert_eq!(map.snapshot().len(), 500);
    }

    #[test]
    fn test_take_shard_empties_only_that_shard() {
        let config = CounterConfig::default().with_shards(8);
        let map: ShardedScoreMap = ShardedMap::with_config(&config).unwrap();
        for key in 0..200u64 {
            map.insert(key, key as f32);
        }
        let idx = map.shard_index(150);
        let taken = map.take_shard(idx);
        assert_eq!(taken.get(&150), Some(&150.0));
        assert!(taken.keys().all(|&k| map.shard_index(k) == idx));
        assert_eq!(map.len() + taken.len(), 200);
        assert!(!map.contains_key(150));

        let mut total = taken.len();
        for idx in 0..map.shard_count() {
            total += map.take_shard(idx).len();
        }
        assert_eq!(total, 200);
        assert!(map.is_empty());
    }

    #[test]
    fn test_extend_shard_merges_into_one_shard() {
        let map: ShardedCountMap = ShardedMap::new();
        let idx = map.shard_index(42);
        map.insert(42, 3);
        let keys: Vec<u64> = (0..2000u64)
            .filter(|&k| k != 42 && map.shard_index(k) == idx)
            .take(3)
            .collect();
        let items = keys.iter().map(|&k| (k, 1)).chain([(42, 4)]);
        map.extend_shard(idx, items, |old, n| *old += n);
        assert_eq!(map.get(42), Some(7));
        assert_eq!(map.len(), 4);
        assert!(keys.iter().all(|&k| map.get(k) == Some(1)));
    }

    #[test]
    fn test_poisoned_shard_stays_usable() {
        let map: ShardedCountMap = ShardedMap::new();
        map.insert(1, 1);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            map.upsert(1, || 0, |_| panic!("update failed"));
        }));
        assert!(result.is_err());
        let idx = map.shard_index(1);
        assert!(map.shards[idx].table.is_poisoned());

        map.upsert(1, || 0, |v| *v += 1);
        assert_eq!(map.get(1), Some(2));
        map.insert(2, 5);
        assert_eq!(map.len(), 2);
        assert_eq!(map.retain(|key, _| key == 1), 1);
        assert_eq!(map.snapshot(), HashMap::from([(1, 2)]));
    }

    #[test]
    fn test_with_config_rejects_invalid_shards() {
        let config = CounterConfig::default().with_shards(12);
        assert!(ShardedMap::<u32>::with_config(&config).is_err());
    }

    #[test]
    fn test_concurrent_upserts() {
        let map: ShardedCountMap = ShardedMap::new();
        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for key in 0..1000u64 {
                        map.upsert(key, || 1, |v| *v += 1);
                    }
                });
            }
        });
        assert_eq!(map.len(), 1000);
        map.for_each(|_, &count| assert_eq!(count, 8));
    }
}
