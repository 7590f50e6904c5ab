//! Loader tuning

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoadConfig {
    /// Rows per upsert statement.
    pub batch_size: usize,
    /// Node labels loaded at the same time.
    pub node_concurrency: usize,
    /// Skipped rows kept per load for diagnostics.
    pub max_error_samples: usize,
    /// Whole-run deadline in seconds, 0 for none.
    pub deadline_secs: u64,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            batch_size: 500,
            node_concurrency: 4,
            max_error_samples: 10,
            deadline_secs: 0,
        }
    }
}

impl LoadConfig {
    pub fn deadline(&self) -> Option<Duration> {
        (self.deadline_secs > 0).then(|| Duration::from_secs(self.deadline_secs))
    }
}
