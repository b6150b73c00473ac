use crate::error::{CounterError, Result};
use std::collections::HashMap;

/// Exported view shared by every accumulator.
pub trait Counter {
    type Count;

    fn size(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.size() == 0
    }

    fn get_kmers(&self) -> HashMap<u64, Self::Count>;
}

/// Accumulators fed with `(hashes, abundances, mean_abundance)` batches and
/// finalized once ingestion is over.
pub trait AbundanceCounter: Counter {
    fn add_hashes(&self, hashes: &[u64], abundances: &[f32], mean_abundance: f32) -> Result<()>;

    fn round_scores(&self) -> u64;
}

/// Computes `abundances[i] / mean_abundance` for the whole batch, or fails
/// without side effects if the batch is malformed.
///
/// A ratio is rejected when it is negative or NaN.
pub fn normalized_ratios(
    hashes: &[u64],
    abundances: &[f32],
    mean_abundance: f32,
) -> Result<Vec<f32>> {
    if hashes.len() != abundances.len() {
        return Err(CounterError::LengthMismatch {
            hashes: hashes.len(),
            abundances: abundances.len(),
        });
    }

    hashes
        .iter()
        .zip(abundances)
        .enumerate()
        .map(|(index, (&hash, &abundance))| {
            let value = abundance / mean_abundance;
            if value >= 0.0 {
                Ok(value)
            } else {
                Err(CounterError::InvalidDosage { index, hash, value })
            }
        })
        .collect()
}
