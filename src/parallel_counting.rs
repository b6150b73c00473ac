use crate::counters::{AbundanceCounter, Counter, PlainCounter};
use crate::error::Result;
use log::info;
use rayon::prelude::*;

/// One ingestion batch: the hashes of a sample with their abundances.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub hashes: Vec<u64>,
    pub abundances: Vec<f32>,
    pub mean_abundance: f32,
}

impl Sample {
    pub fn new(hashes: Vec<u64>, abundances: Vec<f32>, mean_abundance: f32) -> Self {
        Sample {
            hashes,
            abundances,
            mean_abundance,
        }
    }

    /// Uses the arithmetic mean of `abundances` as normalization constant,
    /// or 1.0 for an empty sample.
    pub fn with_mean_abundance(hashes: Vec<u64>, abundances: Vec<f32>) -> Self {
        let mean_abundance = if abundances.is_empty() {
            1.0
        } else {
            (abundances.iter().map(|&a| a as f64).sum::<f64>() / abundances.len() as f64) as f32
        };
        Sample::new(hashes, abundances, mean_abundance)
    }
}

/// Feeds every batch to `counter` from the rayon pool and returns once all
/// of them have been ingested.
pub fn count_hashes_parallel(counter: &PlainCounter, batches: &[Vec<u64>]) {
    batches.par_iter().for_each(|b| counter.add_hashes(b));
    info!(
        "ingested {} batches, {} distinct hashes",
        batches.len(),
        counter.size()
    );
}

/// Calls `add_hashes` once per sample from the rayon pool and returns once
/// all of them have been processed.
///
/// Each sample is accepted or rejected on its own. If any sample is
/// rejected, the error of the lowest-indexed one is returned after the
/// others have been ingested.
pub fn add_samples_parallel<C>(counter: &C, samples: &[Sample]) -> Result<()>
where
    C: AbundanceCounter + Sync,
{
    let results: Vec<Result<()>> = samples
        .par_iter()
        .map(|sample| {
            counter.add_hashes(&sample.hashes, &sample.abundances, sample.mean_abundance)
        })
        .collect();

    let rejected = results.iter().filter(|r| r.is_err()).count();
    info!(
        "ingested {} of {} samples",
        samples.len() - rejected,
        samples.len()
    );
    results.into_iter().collect()
}
