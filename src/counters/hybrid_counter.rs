use crate::config::CounterConfig;
use crate::counters::{AbundanceCounter, Counter, normalized_ratios};
use crate::error::Result;
use crate::shard::{ShardTable, ShardedMap};
use log::debug;
use std::collections::HashMap;
use xxhash_rust::xxh64::Xxh64Builder;

/// Per-hash state of a [`HybridDosageCounter`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HybridEntry {
    /// Number of samples in which the hash appeared.
    pub sample_count: u32,
    /// Sum of all normalized abundances seen for the hash.
    pub dosage_sum: f32,
}

impl HybridEntry {
    /// Dosage rounded to the nearest integer, ties away from zero.
    #[inline(always)]
    pub fn rounded_dosage(&self) -> u32 {
        self.dosage_sum.round() as u32
    }
}

/// Index-aligned export of a [`HybridDosageCounter`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HybridExport {
    pub hashes: Vec<u64>,
    pub sample_counts: Vec<u32>,
    pub dosages: Vec<u32>,
}

/// Tracks, for every hash, how many samples it recurs in and its cumulative
/// dosage. Each `add_hashes` call is one sample.
#[derive(Debug, Default)]
pub struct HybridDosageCounter {
    entries: ShardedMap<HybridEntry>,
}

impl HybridDosageCounter {
    pub fn new() -> Self {
        HybridDosageCounter {
            entries: ShardedMap::new(),
        }
    }

    pub fn with_config(config: &CounterConfig) -> Result<Self> {
        Ok(HybridDosageCounter {
            entries: ShardedMap::with_config(config)?,
        })
    }

    /// Ingests one sample.
    ///
    /// A hash listed several times in the same sample counts as one sample
    /// occurrence, while all of its dosages are summed. Nothing is ingested
    /// if the batch fails validation.
    pub fn add_hashes(
        &self,
        hashes: &[u64],
        abundances: &[f32],
        mean_abundance: f32,
    ) -> Result<()> {
        let dosages = normalized_ratios(hashes, abundances, mean_abundance)?;

        let mut sample: ShardTable<f32> =
            ShardTable::with_capacity_and_hasher(hashes.len(), Xxh64Builder::default());
        for (&hash, dosage) in hashes.iter().zip(dosages) {
            *sample.entry(hash).or_insert(0.0) += dosage;
        }

        self.entries.apply_batch(
            sample,
            |dosage| HybridEntry {
                sample_count: 1,
                dosage_sum: dosage,
            },
            |entry, dosage| {
                entry.sample_count = entry.sample_count.saturating_add(1);
                entry.dosage_sum += dosage;
            },
        );
        Ok(())
    }

    /// Keeps only hashes seen in at least two samples and returns how many
    /// were evicted. Dosages are left untouched.
    pub fn round_scores(&self) -> u64 {
        let removed = self.entries.retain(|_, entry| entry.sample_count >= 2) as u64;
        debug!(
            "evicted {} hashes seen in fewer than two samples, {} left",
            removed,
            self.size()
        );
        removed
    }

    pub fn get(&self, hash: u64) -> Option<HybridEntry> {
        self.entries.get(hash)
    }

    pub fn get_hashes(&self) -> Vec<u64> {
        let mut out = Vec::with_capacity(self.entries.len());
        self.entries.for_each(|hash, _| out.push(hash));
        out
    }

    /// Aligned with [`get_hashes`](Self::get_hashes) while the table is not
    /// modified between the calls.
    pub fn get_sample_counts(&self) -> Vec<u32> {
        let mut out = Vec::with_capacity(self.entries.len());
        self.entries
            .for_each(|_, entry| out.push(entry.sample_count));
        out
    }

    /// Rounded dosages, aligned with [`get_hashes`](Self::get_hashes) while
    /// the table is not modified between the calls.
    pub fn get_kmer_dosages(&self) -> Vec<u32> {
        let mut out = Vec::with_capacity(self.entries.len());
        self.entries
            .for_each(|_, entry| out.push(entry.rounded_dosage()));
        out
    }

    /// All three aligned sequences in a single pass.
    pub fn export(&self) -> HybridExport {
        let len = self.entries.len();
        let mut export = HybridExport {
            hashes: Vec::with_capacity(len),
            sample_counts: Vec::with_capacity(len),
            dosages: Vec::with_capacity(len),
        };
        self.entries.for_each(|hash, entry| {
            export.hashes.push(hash);
            export.sample_counts.push(entry.sample_count);
            export.dosages.push(entry.rounded_dosage());
        });
        export
    }
}

impl Counter for HybridDosageCounter {
    /// `(sample_count, rounded_dosage)`
    type Count = (u32, u32);

    fn size(&self) -> u64 {
        self.entries.len() as u64
    }

    fn get_kmers(&self) -> HashMap<u64, (u32, u32)> {
        let mut out = HashMap::with_capacity(self.entries.len());
        self.entries.for_each(|hash, entry| {
            out.insert(hash, (entry.sample_count, entry.rounded_dosage()));
        });
        out
    }
}

impl AbundanceCounter for HybridDosageCounter {
    fn add_hashes(&self, hashes: &[u64], abundances: &[f32], mean_abundance: f32) -> Result<()> {
        HybridDosageCounter::add_hashes(self, hashes, abundances, mean_abundance)
    }

    fn round_scores(&self) -> u64 {
        HybridDosageCounter::round_scores(self)
    }
}
