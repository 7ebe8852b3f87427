use std::time::Duration;

use serde::Deserialize;

/// Bucket parameters as they appear in a configuration file.
///
/// ```toml
/// capacity = 100
/// refill_interval_ms = 10
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BucketConfig {
    /// Maximum number of tokens held at once
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// Period between refills (milliseconds)
    #[serde(default = "default_refill_interval_ms")]
    pub refill_interval_ms: u64,
}

fn default_capacity() -> usize {
    10
}

fn default_refill_interval_ms() -> u64 {
    1000
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            refill_interval_ms: default_refill_interval_ms(),
        }
    }
}

impl BucketConfig {
    pub fn refill_interval(&self) -> Duration {
        Duration::from_millis(self.refill_interval_ms)
    }
}
