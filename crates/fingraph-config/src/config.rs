//! Top-level configuration assembly

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

use crate::components::{
    LoadConfig, LoggingConfig, Neo4jConfig, RetryConfig, SourcesConfig, TABLE_ENV_VARS,
};
use crate::error::ConfigError;

/// Everything the loader needs, built once at process entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EtlConfig {
    pub neo4j: Neo4jConfig,
    pub sources: SourcesConfig,
    pub load: LoadConfig,
    pub retry: RetryConfig,
    pub logging: LoggingConfig,
    /// Replaces the built-in finance schema when set.
    pub schema_file: Option<PathBuf>,
}

impl EtlConfig {
    /// Parse a TOML document. Missing sections take their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Read `path` (or start from defaults), apply process environment
    /// overrides, then validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                debug!(path = %path.display(), "loaded config file");
                Self::from_toml_str(&text)?
            }
            None => Self::default(),
        };

        config.apply_env(|var| std::env::var(var).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(uri) = lookup("NEO4J_URI") {
            self.neo4j.uri = uri;
        }
        if let Some(username) = lookup("NEO4J_USERNAME") {
            self.neo4j.username = username;
        }
        if let Some(password) = lookup("NEO4J_PASSWORD") {
            self.neo4j.password = password;
        }
        if let Some(database) = lookup("NEO4J_DATABASE") {
            self.neo4j.database = database;
        }

        for (table, var) in TABLE_ENV_VARS {
            if let Some(path) = lookup(var) {
                debug!(table, var, "table path overridden from environment");
                self.sources.tables.insert(table.to_string(), PathBuf::from(path));
            }
        }

        if let Some(value) = parse_env(&lookup, "FINGRAPH_BATCH_SIZE")? {
            self.load.batch_size = value;
        }
        if let Some(value) = parse_env(&lookup, "FINGRAPH_MAX_ATTEMPTS")? {
            self.retry.max_attempts = value;
        }
        if let Some(value) = parse_env(&lookup, "FINGRAPH_RETRY_DELAY_SECS")? {
            self.retry.delay_secs = value;
        }

        Ok(())
    }

    /// Reject settings that would make a run meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.neo4j.uri.trim().is_empty() {
            return Err(ConfigError::Invalid("neo4j.uri must not be empty".into()));
        }
        if self.neo4j.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "neo4j.max_connections must be at least 1".into(),
            ));
        }
        if self.load.batch_size == 0 {
            return Err(ConfigError::Invalid("load.batch_size must be at least 1".into()));
        }
        if self.load.node_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "load.node_concurrency must be at least 1".into(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("retry.max_attempts must be at least 1".into()));
        }
        Ok(())
    }
}

fn parse_env<F, T>(lookup: &F, var: &str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(var) {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv {
                var: var.to_string(),
                value,
            }),
        None => Ok(None),
    }
}
