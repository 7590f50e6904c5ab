//! # fingraph configuration
//!
//! One explicit [`EtlConfig`] is built at process entry and passed by
//! reference to everything that needs it. Nothing here reads the environment
//! at import time: [`EtlConfig::load`] reads an optional TOML file and then
//! applies overrides through a lookup function, which tests replace with a
//! map.
//!
//! ```rust,no_run
//! use fingraph_config::EtlConfig;
//!
//! let config = EtlConfig::load(Some(std::path::Path::new("fingraph.toml")))?;
//! println!("loading into {}", config.neo4j.uri);
//! # Ok::<(), fingraph_config::ConfigError>(())
//! ```

#![warn(clippy::all)]

pub mod components;
mod config;
mod error;

pub use components::*;
pub use config::*;
pub use error::*;
