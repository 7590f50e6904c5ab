//! # fingraph ETL
//!
//! Loads header-described tabular sources into a property graph through a
//! [`GraphStore`](fingraph_core::GraphStore), in three strictly ordered
//! phases:
//!
//! 1. [`ensure_constraints`]: one uniqueness constraint per node label
//! 2. [`load_nodes`] for every node label, concurrently across labels
//! 3. [`load_relationships`] for every relationship type, once all nodes are in
//!
//! [`Orchestrator`] sequences the phases, wraps the whole run in a
//! [`RetryPolicy`], honours cancellation and deadlines between batches, and
//! returns a [`RunReport`]. Every write is a merge, so re-running against
//! unchanged sources leaves the graph as it was.
//!
//! Row-level problems ([`RowError`]) never escape a loader: they are counted
//! and sampled in the [`LoadCount`]. Phase-level problems ([`EtlError`]) abort
//! the run.

#![warn(clippy::all)]

mod constraints;
mod error;
mod nodes;
mod options;
mod orchestrator;
mod relationships;
mod report;
mod retry;
pub mod source;
mod verify;

pub use constraints::ensure_constraints;
pub use error::{EtlError, RowError, SourceError};
pub use nodes::load_nodes;
pub use options::LoadOptions;
pub use orchestrator::Orchestrator;
pub use relationships::load_relationships;
pub use report::{LoadCount, Phase, RunFailure, RunReport, Stage};
pub use retry::RetryPolicy;
pub use source::{CsvSource, SourceCatalog, TabularSource};
pub use verify::{verify_graph, SchemaDrift};

pub use tokio_util::sync::CancellationToken;
