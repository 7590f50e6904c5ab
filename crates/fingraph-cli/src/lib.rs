//! # fingraph CLI
//!
//! Argument parsing, logging setup and report rendering for the `fingraph`
//! binary. Loading itself lives in `fingraph-etl`.

pub mod cli;
pub mod commands;
pub mod logging;
pub mod output;
