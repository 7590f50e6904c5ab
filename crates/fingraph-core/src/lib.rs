//! # fingraph core
//!
//! Database-agnostic building blocks for loading tabular financial records
//! into a property graph:
//!
//! - [`schema`]: the declarative Schema Registry (node and relationship
//!   specifications) and the built-in finance schema
//! - [`value`]: typed property values and the column coercions that produce them
//! - [`cypher`]: parameterised statement rendering for Cypher-speaking stores
//! - [`store`]: the `GraphStore` / `GraphSession` seam the loaders write through
//! - [`memory`]: an in-process `GraphStore` with the same merge semantics
//!
//! Backends live in their own crates (`fingraph-neo4j`); orchestration lives in
//! `fingraph-etl`.

#![warn(clippy::all)]

pub mod cypher;
pub mod error;
pub mod memory;
pub mod schema;
pub mod store;
pub mod value;

pub use error::{GraphError, GraphResult, SchemaError};
pub use memory::{JournalEntry, MemoryGraphStore};
pub use schema::{
    Direction, Identifier, NodeSpec, PropertyMapping, RelationshipSpec, SchemaRegistry,
};
pub use store::{
    EdgeMergeOutcome, EdgePattern, EdgeRow, GraphSession, GraphStore, LabelSummary, NodeRef,
    NodeRow, RelationshipSummary, SchemaSnapshot,
};
pub use value::{Coercion, CoercionError, NodeKey, PropertyValue};
