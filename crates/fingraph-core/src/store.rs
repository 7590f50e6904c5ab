//! Graph store abstraction
//!
//! Loaders talk to the database only through these two traits. A
//! [`GraphStore`] is the shared, cheaply clonable handle (connection pool);
//! a [`GraphSession`] is acquired per logical unit of work (one label, one
//! relationship type) and released with [`GraphSession::close`] or on drop.
//!
//! Every `merge_*` call is one batch in one transaction: a batch either
//! lands entirely or not at all, and batches already committed stay
//! committed if a later one fails.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::error::GraphResult;
use crate::schema::{Direction, Identifier, NodeSpec, RelationshipSpec};
use crate::value::{NodeKey, PropertyValue};

/// How to find a node: its label and the property its key is stored under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeRef {
    pub label: Identifier,
    pub key_property: Identifier,
}

impl From<&NodeSpec> for NodeRef {
    fn from(spec: &NodeSpec) -> Self {
        Self {
            label: spec.label.clone(),
            key_property: spec.key_property.clone(),
        }
    }
}

/// A relationship type with its stored start and end, direction applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgePattern {
    pub rel_type: Identifier,
    pub start: NodeRef,
    pub end: NodeRef,
}

impl EdgePattern {
    /// Resolve a relationship specification against its endpoint node specs.
    pub fn resolve(rel: &RelationshipSpec, from: &NodeSpec, to: &NodeSpec) -> Self {
        let (start, end) = match rel.direction {
            Direction::Forward => (NodeRef::from(from), NodeRef::from(to)),
            Direction::Reverse => (NodeRef::from(to), NodeRef::from(from)),
        };
        Self {
            rel_type: rel.rel_type.clone(),
            start,
            end,
        }
    }
}

/// One node upsert: the key plus the freshly coerced mapped properties.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeRow {
    pub key: NodeKey,
    pub properties: BTreeMap<Identifier, PropertyValue>,
}

/// One relationship upsert, keys already oriented as `start -> end`.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeRow {
    pub start: NodeKey,
    pub end: NodeKey,
}

/// Result of merging one relationship batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EdgeMergeOutcome {
    /// Rows whose edge was created or already present.
    pub merged: u64,
    /// Batch positions whose start or end node does not exist.
    pub unresolved: Vec<usize>,
}

/// What a store currently holds, for schema grounding and verification.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SchemaSnapshot {
    pub labels: BTreeMap<String, LabelSummary>,
    pub relationships: BTreeMap<String, RelationshipSummary>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LabelSummary {
    pub count: u64,
    pub properties: BTreeSet<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RelationshipSummary {
    pub count: u64,
    /// Observed `(start label, end label)` pairs.
    pub endpoints: BTreeSet<(String, String)>,
}

/// Shared handle to a graph database.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Human-readable backend name for logs.
    fn name(&self) -> &str;

    /// Round-trip to the store; fails with a transient error when unreachable.
    async fn verify_connectivity(&self) -> GraphResult<()>;

    /// Acquire a session for one unit of work.
    async fn session(&self) -> GraphResult<Box<dyn GraphSession>>;

    /// Describe labels, relationship types and properties currently stored.
    async fn introspect(&self) -> GraphResult<SchemaSnapshot>;
}

/// A scoped unit of work against the store.
#[async_trait]
pub trait GraphSession: Send {
    /// Create a uniqueness constraint on `label.key_property` unless one exists.
    async fn ensure_unique_constraint(
        &mut self,
        label: &Identifier,
        key_property: &Identifier,
    ) -> GraphResult<()>;

    /// Merge a batch of nodes by key, overwriting only the provided properties.
    ///
    /// Returns the number of rows written.
    async fn merge_nodes(&mut self, target: &NodeRef, rows: &[NodeRow]) -> GraphResult<u64>;

    /// Merge a batch of edges between existing nodes. Never creates endpoints.
    async fn merge_relationships(
        &mut self,
        pattern: &EdgePattern,
        rows: &[EdgeRow],
    ) -> GraphResult<EdgeMergeOutcome>;

    /// Release the session.
    async fn close(self: Box<Self>) -> GraphResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaRegistry;

    #[test]
    fn reverse_direction_swaps_stored_endpoints() {
        let finance = SchemaRegistry::finance();
        let linked = finance
            .relationships()
            .iter()
            .find(|r| r.rel_type.as_str() == "LINKED_WITH")
            .unwrap();
        let (from, to) = finance.endpoints(linked).unwrap();
        let pattern = EdgePattern::resolve(linked, from, to);

        assert_eq!(pattern.start.label.as_str(), "Customer");
        assert_eq!(pattern.end.label.as_str(), "Account");
    }

    #[test]
    fn forward_direction_keeps_declared_endpoints() {
        let finance = SchemaRegistry::finance();
        let employs = &finance.relationships()[0];
        let (from, to) = finance.endpoints(employs).unwrap();
        let pattern = EdgePattern::resolve(employs, from, to);

        assert_eq!(pattern.start.label.as_str(), "Branch");
        assert_eq!(pattern.end.label.as_str(), "Employee");
        assert_eq!(pattern.end.key_property.as_str(), "id");
    }
}
