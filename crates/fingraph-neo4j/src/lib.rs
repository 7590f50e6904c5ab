//! # fingraph Neo4j backend
//!
//! [`Neo4jStore`] implements [`fingraph_core::GraphStore`] over Bolt with
//! `neo4rs`. Statements come from [`fingraph_core::cypher`]; every batch is a
//! single parameterised `UNWIND $rows` statement run as its own auto-commit
//! transaction.

#![warn(clippy::all)]

mod convert;
mod error;
mod store;

pub use error::classify;
pub use store::Neo4jStore;
