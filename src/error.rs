use thiserror::Error;

/// Errors raised by the accumulators.
///
/// Every variant is a caller-input error: the batch or configuration is
/// rejected before any table is touched.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CounterError {
    #[error("hashes and abundances differ in length ({hashes} != {abundances})")]
    LengthMismatch { hashes: usize, abundances: usize },
    #[error("invalid dosage {value} for hash {hash} at index {index}")]
    InvalidDosage { index: usize, hash: u64, value: f32 },
    #[error("shard count must be a power of two in 1..={max}, got {got}")]
    InvalidShardCount { got: usize, max: usize },
}

pub type Result<T> = std::result::Result<T, CounterError>;
