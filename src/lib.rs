pub mod config;
pub mod counters;
pub mod error;
pub mod parallel_counting;
pub mod shard;

pub use config::CounterConfig;
pub use counters::AbundanceCounter;
pub use counters::Counter;
pub use counters::HybridDosageCounter;
pub use counters::PlainCounter;
pub use counters::WeightedCounter;
pub use counters::WeightedCounterUncapped;
pub use error::{CounterError, Result};
pub use shard::{ShardedCountMap, ShardedMap, ShardedScoreMap};
