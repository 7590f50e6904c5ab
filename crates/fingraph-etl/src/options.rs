use fingraph_config::LoadConfig;

/// Per-load tuning shared by both loaders.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadOptions {
    /// Rows per upsert statement.
    pub batch_size: usize,
    /// Node labels loaded at the same time.
    pub node_concurrency: usize,
    /// Skipped rows kept per load for diagnostics.
    pub max_error_samples: usize,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self::from(&LoadConfig::default())
    }
}

impl From<&LoadConfig> for LoadOptions {
    fn from(config: &LoadConfig) -> Self {
        Self {
            batch_size: config.batch_size.max(1),
            node_concurrency: config.node_concurrency.max(1),
            max_error_samples: config.max_error_samples,
        }
    }
}
