pub mod counter_base;
pub mod hybrid_counter;
pub mod plain_counter;
pub mod weighted_counter;

pub use counter_base::{AbundanceCounter, Counter, normalized_ratios};
pub use hybrid_counter::{HybridDosageCounter, HybridEntry, HybridExport};
pub use plain_counter::PlainCounter;
pub use weighted_counter::{
    CapPolicy, Capped, MAX_CONTRIBUTION, Uncapped, WeightedCounter, WeightedCounterUncapped,
};
