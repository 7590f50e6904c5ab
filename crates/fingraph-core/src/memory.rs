//! In-process graph store.
//!
//! `MemoryGraphStore` implements the same merge semantics as the Cypher
//! statements in [`crate::cypher`]: nodes are identified by
//! `(label, key property, key)`, `SET n += props` leaves unmentioned
//! properties alone, and relationships collapse to one edge per
//! `(type, start, end)`. It backs dry runs and tests, and records an ordered
//! journal of write operations so callers can assert on phase ordering.
//!
//! Clones share state.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::trace;

use crate::error::GraphResult;
use crate::schema::Identifier;
use crate::store::{
    EdgeMergeOutcome, EdgePattern, EdgeRow, GraphSession, GraphStore, LabelSummary, NodeRef,
    NodeRow, RelationshipSummary, SchemaSnapshot,
};
use crate::value::{NodeKey, PropertyValue};

/// One write operation, in the order the store applied it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalEntry {
    ConstraintEnsured { label: String },
    NodesMerged { label: String, rows: usize },
    RelationshipsMerged { rel_type: String, rows: usize },
}

#[derive(Debug)]
struct StoredNode {
    label: Identifier,
    properties: BTreeMap<String, PropertyValue>,
}

#[derive(Debug, Default)]
struct MemoryGraph {
    constraints: BTreeSet<(Identifier, Identifier)>,
    nodes: Vec<StoredNode>,
    index: HashMap<(Identifier, Identifier, NodeKey), usize>,
    edges: BTreeSet<(Identifier, usize, usize)>,
    journal: Vec<JournalEntry>,
}

impl MemoryGraph {
    fn lookup(&self, node: &NodeRef, key: &NodeKey) -> Option<usize> {
        self.index
            .get(&(node.label.clone(), node.key_property.clone(), key.clone()))
            .copied()
    }
}

/// Shared in-memory graph.
#[derive(Debug, Clone, Default)]
pub struct MemoryGraphStore {
    inner: Arc<Mutex<MemoryGraph>>,
}

impl MemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of nodes carrying `label`.
    pub fn node_count(&self, label: &str) -> usize {
        let graph = self.inner.lock();
        graph
            .nodes
            .iter()
            .filter(|n| n.label.as_str() == label)
            .count()
    }

    /// Total nodes across all labels.
    pub fn total_nodes(&self) -> usize {
        self.inner.lock().nodes.len()
    }

    /// Number of edges of `rel_type`.
    pub fn edge_count(&self, rel_type: &str) -> usize {
        let graph = self.inner.lock();
        graph
            .edges
            .iter()
            .filter(|(t, _, _)| t.as_str() == rel_type)
            .count()
    }

    pub fn total_edges(&self) -> usize {
        self.inner.lock().edges.len()
    }

    /// Properties of the node identified by `(node.label, node.key_property, key)`.
    pub fn node(&self, node: &NodeRef, key: &NodeKey) -> Option<BTreeMap<String, PropertyValue>> {
        let graph = self.inner.lock();
        graph
            .lookup(node, key)
            .map(|id| graph.nodes[id].properties.clone())
    }

    /// Whether an edge `start -[rel_type]-> end` exists.
    pub fn has_edge(&self, pattern: &EdgePattern, start: &NodeKey, end: &NodeKey) -> bool {
        let graph = self.inner.lock();
        match (
            graph.lookup(&pattern.start, start),
            graph.lookup(&pattern.end, end),
        ) {
            (Some(a), Some(b)) => graph.edges.contains(&(pattern.rel_type.clone(), a, b)),
            _ => false,
        }
    }

    /// Labels with a uniqueness constraint, as `(label, property)`.
    pub fn constraints(&self) -> Vec<(String, String)> {
        self.inner
            .lock()
            .constraints
            .iter()
            .map(|(l, p)| (l.to_string(), p.to_string()))
            .collect()
    }

    /// Write operations applied so far, oldest first.
    pub fn journal(&self) -> Vec<JournalEntry> {
        self.inner.lock().journal.clone()
    }
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn verify_connectivity(&self) -> GraphResult<()> {
        Ok(())
    }

    async fn session(&self) -> GraphResult<Box<dyn GraphSession>> {
        Ok(Box::new(MemorySession {
            graph: Arc::clone(&self.inner),
        }))
    }

    async fn introspect(&self) -> GraphResult<SchemaSnapshot> {
        let graph = self.inner.lock();
        let mut snapshot = SchemaSnapshot::default();

        for node in &graph.nodes {
            let summary: &mut LabelSummary = snapshot
                .labels
                .entry(node.label.to_string())
                .or_default();
            summary.count += 1;
            summary.properties.extend(node.properties.keys().cloned());
        }

        for (rel_type, start, end) in &graph.edges {
            let summary: &mut RelationshipSummary = snapshot
                .relationships
                .entry(rel_type.to_string())
                .or_default();
            summary.count += 1;
            summary.endpoints.insert((
                graph.nodes[*start].label.to_string(),
                graph.nodes[*end].label.to_string(),
            ));
        }

        Ok(snapshot)
    }
}

struct MemorySession {
    graph: Arc<Mutex<MemoryGraph>>,
}

#[async_trait]
impl GraphSession for MemorySession {
    async fn ensure_unique_constraint(
        &mut self,
        label: &Identifier,
        key_property: &Identifier,
    ) -> GraphResult<()> {
        let mut graph = self.graph.lock();
        graph
            .constraints
            .insert((label.clone(), key_property.clone()));
        graph.journal.push(JournalEntry::ConstraintEnsured {
            label: label.to_string(),
        });
        Ok(())
    }

    async fn merge_nodes(&mut self, target: &NodeRef, rows: &[NodeRow]) -> GraphResult<u64> {
        let mut graph = self.graph.lock();
        for row in rows {
            let index_key = (
                target.label.clone(),
                target.key_property.clone(),
                row.key.clone(),
            );
            let existing = graph.index.get(&index_key).copied();
            let id = match existing {
                Some(id) => id,
                None => {
                    let id = graph.nodes.len();
                    let mut properties = BTreeMap::new();
                    properties.insert(
                        target.key_property.to_string(),
                        PropertyValue::from(row.key.clone()),
                    );
                    graph.nodes.push(StoredNode {
                        label: target.label.clone(),
                        properties,
                    });
                    graph.index.insert(index_key, id);
                    id
                }
            };
            let node = &mut graph.nodes[id];
            for (property, value) in &row.properties {
                node.properties.insert(property.to_string(), value.clone());
            }
        }
        trace!(label = %target.label, rows = rows.len(), "merged node batch");
        graph.journal.push(JournalEntry::NodesMerged {
            label: target.label.to_string(),
            rows: rows.len(),
        });
        Ok(rows.len() as u64)
    }

    async fn merge_relationships(
        &mut self,
        pattern: &EdgePattern,
        rows: &[EdgeRow],
    ) -> GraphResult<EdgeMergeOutcome> {
        let mut graph = self.graph.lock();
        let mut outcome = EdgeMergeOutcome::default();
        for (idx, row) in rows.iter().enumerate() {
            match (
                graph.lookup(&pattern.start, &row.start),
                graph.lookup(&pattern.end, &row.end),
            ) {
                (Some(a), Some(b)) => {
                    graph.edges.insert((pattern.rel_type.clone(), a, b));
                    outcome.merged += 1;
                }
                _ => outcome.unresolved.push(idx),
            }
        }
        graph.journal.push(JournalEntry::RelationshipsMerged {
            rel_type: pattern.rel_type.to_string(),
            rows: rows.len(),
        });
        Ok(outcome)
    }

    async fn close(self: Box<Self>) -> GraphResult<()> {
        Ok(())
    }
}
