use crate::error::{CounterError, Result};

/// Default number of shards. Power of two so routing is a mask.
pub const DEFAULT_SHARDS: usize = 64;

/// Upper bound on the shard count.
pub const MAX_SHARDS: usize = 4096;

/// Construction parameters shared by every accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterConfig {
    pub shards: usize,
}

impl Default for CounterConfig {
    fn default() -> Self {
        CounterConfig {
            shards: DEFAULT_SHARDS,
        }
    }
}

impl CounterConfig {
    pub fn with_shards(mut self, shards: usize) -> Self {
        self.shards = shards;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.shards == 0 || !self.shards.is_power_of_two() || self.shards > MAX_SHARDS {
            return Err(CounterError::InvalidShardCount {
                got: self.shards,
                max: MAX_SHARDS,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = CounterConfig::default();
        assert_eq!(config.shards, 64);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_shard_counts() {
        for shards in [0, 3, 48, MAX_SHARDS * 2] {
            let err = CounterConfig::default().with_shards(shards).validate();
            assert_eq!(
                err,
                Err(CounterError::InvalidShardCount {
                    got: shards,
                    max: MAX_SHARDS
                })
            );
        }
        assert!(CounterConfig::default().with_shards(1).validate().is_ok());
        assert!(
            CounterConfig::default()
                .with_shards(MAX_SHARDS)
                .validate()
                .is_ok()
        );
    }
}
