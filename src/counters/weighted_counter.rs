use crate::config::CounterConfig;
use crate::counters::{AbundanceCounter, Counter, normalized_ratios};
use crate::error::Result;
use crate::shard::{ShardedCountMap, ShardedMap, ShardedScoreMap};
use log::debug;
use rayon::prelude::*;
use std::collections::HashMap;
use std::marker::PhantomData;

/// Largest contribution a single occurrence may add under [`Capped`].
pub const MAX_CONTRIBUTION: f32 = 2.0;

/// Maps a normalized abundance ratio to the score added for one occurrence.
pub trait CapPolicy {
    fn contribution(ratio: f32) -> f32;
}

/// Each occurrence adds at most [`MAX_CONTRIBUTION`].
#[derive(Debug, Default, Clone, Copy)]
pub struct Capped;

/// Each occurrence adds its raw ratio.
#[derive(Debug, Default, Clone, Copy)]
pub struct Uncapped;

impl CapPolicy for Capped {
    #[inline(always)]
    fn contribution(ratio: f32) -> f32 {
        ratio.min(MAX_CONTRIBUTION)
    }
}

impl CapPolicy for Uncapped {
    #[inline(always)]
    fn contribution(ratio: f32) -> f32 {
        ratio
    }
}

/// Accumulates abundance-weighted scores, then turns them into integer
/// counts in a single [`round_scores`](Self::round_scores) pass.
///
/// Scores live in a transient table until finalization; `size`,
/// `get_kmers` and `keep_min_abundance` only see finalized counts.
#[derive(Debug)]
pub struct WeightedCounter<P = Capped> {
    scores: ShardedScoreMap,
    counts: ShardedCountMap,
    _policy: PhantomData<fn() -> P>,
}

pub type WeightedCounterUncapped = WeightedCounter<Uncapped>;

impl<P> Default for WeightedCounter<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> WeightedCounter<P> {
    pub fn new() -> Self {
        WeightedCounter {
            scores: ShardedMap::new(),
            counts: ShardedMap::new(),
            _policy: PhantomData,
        }
    }

    /// Both tables share one shard count, so a key routes to the same shard
    /// index in either of them.
    pub fn with_config(config: &CounterConfig) -> Result<Self> {
        Ok(WeightedCounter {
            scores: ShardedMap::with_config(config)?,
            counts: ShardedMap::with_config(config)?,
            _policy: PhantomData,
        })
    }

    /// Pending score of `hash`, before finalization.
    pub fn score(&self, hash: u64) -> Option<f32> {
        self.scores.get(hash)
    }

    /// Number of hashes waiting for finalization.
    pub fn pending(&self) -> u64 {
        self.scores.len() as u64
    }

    /// Finalized count of `hash`.
    pub fn get(&self, hash: u64) -> Option<u32> {
        self.counts.get(hash)
    }

    pub fn keep_min_abundance(&self, min_abundance: u32) {
        let removed = self.counts.retain(|_, count| *count >= min_abundance);
        debug!(
            "min abundance {} removed {} hashes, {} left",
            min_abundance,
            removed,
            self.counts.len()
        );
    }

    /// Truncates every pending score. Hashes whose truncated score is above
    /// one are added to the count table, the rest are dropped. The score
    /// table is empty afterwards. Returns the number of dropped hashes.
    pub fn round_scores(&self) -> u64 {
        let (promoted, skipped) = (0..self.scores.shard_count())
            .into_par_iter()
            .map(|idx| {
                let mut skipped = 0u64;
                let promoted: Vec<(u64, u32)> = self
                    .scores
                    .take_shard(idx)
                    .into_iter()
                    .filter_map(|(hash, score)| {
                        let truncated = score.trunc();
                        if truncated > 1.0 {
                            Some((hash, truncated as u32))
                        } else {
                            skipped += 1;
                            None
                        }
                    })
                    .collect();
                let kept = promoted.len() as u64;
                self.counts.extend_shard(idx, promoted, |old, count| {
                    *old = old.saturating_add(count);
                });
                (kept, skipped)
            })
            .reduce(|| (0, 0), |a, b| (a.0 + b.0, a.1 + b.1));

        debug!("finalized scores: {} promoted, {} skipped", promoted, skipped);
        skipped
    }
}

impl<P: CapPolicy> WeightedCounter<P> {
    /// Adds `contribution(abundances[i] / mean_abundance)` to the score of
    /// `hashes[i]`. The batch is validated as a whole before any score is
    /// touched.
    pub fn add_hashes(
        &self,
        hashes: &[u64],
        abundances: &[f32],
        mean_abundance: f32,
    ) -> Result<()> {
        let ratios = normalized_ratios(hashes, abundances, mean_abundance)?;
        self.scores.apply_batch(
            hashes
                .iter()
                .copied()
                .zip(ratios.into_iter().map(P::contribution)),
            |contribution| contribution,
            |score, contribution| *score += contribution,
        );
        Ok(())
    }
}

impl<P> Counter for WeightedCounter<P> {
    type Count = u32;

    fn size(&self) -> u64 {
        self.counts.len() as u64
    }

    fn get_kmers(&self) -> HashMap<u64, u32> {
        self.counts.snapshot()
    }
}

impl<P: CapPolicy> AbundanceCounter for WeightedCounter<P> {
    fn add_hashes(&self, hashes: &[u64], abundances: &[f32], mean_abundance: f32) -> Result<()> {
        WeightedCounter::add_hashes(self, hashes, abundances, mean_abundance)
    }

    fn round_scores(&self) -> u64 {
        WeightedCounter::round_scores(self)
    }
}
