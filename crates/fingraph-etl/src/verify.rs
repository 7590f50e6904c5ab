//! Schema verification
//!
//! Compares what the store reports through introspection with the registry,
//! so the graph can be trusted to describe itself to schema-grounded
//! consumers.

use fingraph_core::{EdgePattern, GraphStore, SchemaRegistry, SchemaSnapshot};
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{info, warn};

use crate::error::EtlError;

/// Differences between the declared schema and the stored graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SchemaDrift {
    /// Declared labels with no nodes in the store.
    pub missing_labels: Vec<String>,
    /// Stored labels the registry does not declare.
    pub unexpected_labels: Vec<String>,
    /// Declared relationship types with no edges in the store.
    pub missing_relationships: Vec<String>,
    /// Stored relationship types the registry does not declare.
    pub unexpected_relationships: Vec<String>,
    /// `(label, property)` declared but seen on no node of a non-empty label.
    pub unobserved_properties: Vec<(String, String)>,
    /// `(type, start label, end label)` stored between undeclared label pairs.
    pub misdirected: Vec<(String, String, String)>,
}

impl SchemaDrift {
    pub fn is_empty(&self) -> bool {
        self.missing_labels.is_empty()
            && self.unexpected_labels.is_empty()
            && self.missing_relationships.is_empty()
            && self.unexpected_relationships.is_empty()
            && self.unobserved_properties.is_empty()
            && self.misdirected.is_empty()
    }

    /// Compare a snapshot against the registry.
    pub fn compare(registry: &SchemaRegistry, snapshot: &SchemaSnapshot) -> Self {
        let mut drift = SchemaDrift::default();

        let declared_labels: BTreeSet<&str> = registry.labels().map(|l| l.as_str()).collect();
        for node in registry.nodes() {
            match snapshot.labels.get(node.label.as_str()) {
                Some(summary) if summary.count > 0 => {
                    let declared = std::iter::once(&node.key_property)
                        .chain(node.properties.iter().map(|m| &m.property));
                    for property in declared {
                        if !summary.properties.contains(property.as_str()) {
                            drift
                                .unobserved_properties
                                .push((node.label.to_string(), property.to_string()));
                        }
                    }
                }
                _ => drift.missing_labels.push(node.label.to_string()),
            }
        }
        drift.unexpected_labels = snapshot
            .labels
            .keys()
            .filter(|label| !declared_labels.contains(label.as_str()))
            .cloned()
            .collect();

        let mut declared_types = BTreeSet::new();
        for rel in registry.relationships() {
            declared_types.insert(rel.rel_type.as_str());
            let Some(summary) = snapshot.relationships.get(rel.rel_type.as_str()) else {
                drift.missing_relationships.push(rel.rel_type.to_string());
                continue;
            };
            let expected = registry.endpoints(rel).map(|(from, to)| {
                let pattern = EdgePattern::resolve(rel, from, to);
                (pattern.start.label.to_string(), pattern.end.label.to_string())
            });
            for (start, end) in &summary.endpoints {
                if expected.as_ref() != Some(&(start.clone(), end.clone())) {
                    drift
                        .misdirected
                        .push((rel.rel_type.to_string(), start.clone(), end.clone()));
                }
            }
        }
        drift.unexpected_relationships = snapshot
            .relationships
            .keys()
            .filter(|rel_type| !declared_types.contains(rel_type.as_str()))
            .cloned()
            .collect();

        drift
    }
}

/// Introspect `store` and compare it with `registry`.
pub async fn verify_graph(
    store: &dyn GraphStore,
    registry: &SchemaRegistry,
) -> Result<SchemaDrift, EtlError> {
    let snapshot = store.introspect().await?;
    let drift = SchemaDrift::compare(registry, &snapshot);
    if drift.is_empty() {
        info!(store = store.name(), "graph matches the declared schema");
    } else {
        warn!(
            store = store.name(),
            missing_labels = ?drift.missing_labels,
            unexpected_labels = ?drift.unexpected_labels,
            missing_relationships = ?drift.missing_relationships,
            unobserved_properties = drift.unobserved_properties.len(),
            misdirected = drift.misdirected.len(),
            "graph differs from the declared schema"
        );
    }
    Ok(drift)
}
