//! Subscriber installation for the binary

use anyhow::{anyhow, Result};
use fingraph_config::{LogFormat, LoggingConfig};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Filter directive used when `RUST_LOG` is unset.
pub fn default_directive(config: &LoggingConfig, level: Option<LevelFilter>) -> String {
    match level {
        Some(level) => level.to_string().to_lowercase(),
        None => config.level.clone(),
    }
}

/// Install the global subscriber. Logs go to stderr so reports on stdout stay
/// machine-readable.
pub fn init(config: &LoggingConfig, level: Option<LevelFilter>) -> Result<()> {
    let directive = default_directive(config, level);
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&directive)
            .map_err(|e| anyhow!("invalid log filter {directive:?}: {e}"))?,
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    let installed = match config.format {
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|e| anyhow!("failed to install log subscriber: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_level_beats_configured_level() {
        let config = LoggingConfig {
            level: "fingraph_etl=debug".into(),
            ..Default::default()
        };
        assert_eq!(default_directive(&config, None), "fingraph_etl=debug");
        assert_eq!(default_directive(&config, Some(LevelFilter::WARN)), "warn");
    }
}
