//! Schema Registry
//!
//! Declares the target graph: which table feeds which node label, how its
//! columns map to typed properties, and which relationship types connect
//! which labels. The registry is immutable once built and validated; loaders
//! only ever read it.
//!
//! The built-in [`SchemaRegistry::finance`] schema covers branches, employees,
//! customers, accounts, transactions and reviews. A registry can also be read
//! from TOML with [`SchemaRegistry::from_toml`]:
//!
//! ```toml
//! [[nodes]]
//! label = "Branch"
//! table = "branches"
//! key_column = "branch_id"
//! key_property = "id"
//! key_coercion = "integer"
//! properties = [
//!     { column = "branch_name", property = "name" },
//!     { column = "location", property = "location" },
//! ]
//!
//! [[relationships]]
//! type = "EMPLOYS"
//! table = "employees"
//! from_label = "Branch"
//! from_key_column = "branch_id"
//! to_label = "Employee"
//! to_key_column = "employee_id"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::error::SchemaError;
use crate::value::Coercion;

/// A validated graph identifier: label, relationship type or property name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identifier(String);

impl Identifier {
    pub fn new(name: impl Into<String>) -> Result<Self, SchemaError> {
        let name = name.into();
        if is_identifier(&name) {
            Ok(Self(name))
        } else {
            Err(SchemaError::InvalidIdentifier(name))
        }
    }

    /// Build an identifier from a literal known to be valid.
    ///
    /// # Panics
    ///
    /// Panics if `name` is not a valid identifier.
    pub fn from_static(name: &'static str) -> Self {
        assert!(is_identifier(name), "invalid identifier literal {name:?}");
        Self(name.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl TryFrom<String> for Identifier {
    type Error = SchemaError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Identifier::new(value)
    }
}

impl From<Identifier> for String {
    fn from(id: Identifier) -> Self {
        id.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// One source column mapped onto one node property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyMapping {
    pub column: String,
    pub property: Identifier,
    #[serde(default)]
    pub coercion: Coercion,
}

impl PropertyMapping {
    pub fn new(column: impl Into<String>, property: Identifier, coercion: Coercion) -> Self {
        Self {
            column: column.into(),
            property,
            coercion,
        }
    }
}

fn default_key_property() -> Identifier {
    Identifier::from_static("id")
}

fn default_key_coercion() -> Coercion {
    Coercion::Integer
}

/// Declarative mapping from a table to a node label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub label: Identifier,
    /// Name of the table in the source catalog.
    pub table: String,
    pub key_column: String,
    #[serde(default = "default_key_property")]
    pub key_property: Identifier,
    #[serde(default = "default_key_coercion")]
    pub key_coercion: Coercion,
    /// Non-key mappings, in declaration order.
    #[serde(default)]
    pub properties: Vec<PropertyMapping>,
}

impl NodeSpec {
    /// Every column the source table must carry in its header.
    pub fn required_columns(&self) -> Vec<&str> {
        std::iter::once(self.key_column.as_str())
            .chain(self.properties.iter().map(|m| m.column.as_str()))
            .collect()
    }
}

/// Which way the stored edge points relative to the declared endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// `(from)-[:TYPE]->(to)`
    #[default]
    Forward,
    /// `(to)-[:TYPE]->(from)`
    Reverse,
}

/// Declarative mapping from a table to a typed, directed edge between two
/// already-loaded node labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipSpec {
    #[serde(rename = "type")]
    pub rel_type: Identifier,
    pub table: String,
    pub from_label: Identifier,
    pub from_key_column: String,
    pub to_label: Identifier,
    pub to_key_column: String,
    #[serde(default)]
    pub direction: Direction,
}

impl RelationshipSpec {
    pub fn required_columns(&self) -> Vec<&str> {
        vec![self.from_key_column.as_str(), self.to_key_column.as_str()]
    }
}

/// On-disk shape of a registry, validated into [`SchemaRegistry`].
#[derive(Debug, Clone, Deserialize)]
struct RegistryDefinition {
    #[serde(default)]
    nodes: Vec<NodeSpec>,
    #[serde(default)]
    relationships: Vec<RelationshipSpec>,
}

/// Ordered node and relationship specifications for one graph.
///
/// All node specifications complete before any relationship specification
/// starts; order within each list carries no further meaning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RegistryDefinition")]
pub struct SchemaRegistry {
    nodes: Vec<NodeSpec>,
    relationships: Vec<RelationshipSpec>,
}

impl TryFrom<RegistryDefinition> for SchemaRegistry {
    type Error = SchemaError;

    fn try_from(def: RegistryDefinition) -> Result<Self, Self::Error> {
        SchemaRegistry::new(def.nodes, def.relationships)
    }
}

impl SchemaRegistry {
    /// Build and validate a registry.
    pub fn new(
        nodes: Vec<NodeSpec>,
        relationships: Vec<RelationshipSpec>,
    ) -> Result<Self, SchemaError> {
        let mut labels = HashSet::new();
        for node in &nodes {
            if !labels.insert(node.label.clone()) {
                return Err(SchemaError::DuplicateLabel(node.label.to_string()));
            }
            if !node.key_coercion.is_key_compatible() {
                return Err(SchemaError::UnsupportedKeyCoercion {
                    label: node.label.to_string(),
                    coercion: node.key_coercion.to_string(),
                });
            }
            if node.key_column.trim().is_empty() {
                return Err(SchemaError::EmptyColumn {
                    context: format!("key of {}", node.label),
                });
            }

            let mut properties = HashSet::new();
            properties.insert(&node.key_property);
            for mapping in &node.properties {
                if mapping.column.trim().is_empty() {
                    return Err(SchemaError::EmptyColumn {
                        context: format!("{}.{}", node.label, mapping.property),
                    });
                }
                if !properties.insert(&mapping.property) {
                    return Err(SchemaError::DuplicateProperty {
                        label: node.label.to_string(),
                        property: mapping.property.to_string(),
                    });
                }
            }
        }

        let mut rel_types = HashSet::new();
        for rel in &relationships {
            if !rel_types.insert(rel.rel_type.clone()) {
                return Err(SchemaError::DuplicateRelationship(rel.rel_type.to_string()));
            }
            for label in [&rel.from_label, &rel.to_label] {
                if !labels.contains(label) {
                    return Err(SchemaError::UnknownLabel {
                        rel_type: rel.rel_type.to_string(),
                        label: label.to_string(),
                    });
                }
            }
            for column in rel.required_columns() {
                if column.trim().is_empty() {
                    return Err(SchemaError::EmptyColumn {
                        context: format!("endpoint of {}", rel.rel_type),
                    });
                }
            }
        }

        Ok(Self {
            nodes,
            relationships,
        })
    }

    /// Parse and validate a TOML registry definition.
    pub fn from_toml(text: &str) -> Result<Self, SchemaError> {
        toml::from_str(text).map_err(|e| SchemaError::Parse(e.to_string()))
    }

    pub fn nodes(&self) -> &[NodeSpec] {
        &self.nodes
    }

    pub fn relationships(&self) -> &[RelationshipSpec] {
        &self.relationships
    }

    pub fn node(&self, label: &Identifier) -> Option<&NodeSpec> {
        self.nodes.iter().find(|n| &n.label == label)
    }

    pub fn labels(&self) -> impl Iterator<Item = &Identifier> {
        self.nodes.iter().map(|n| &n.label)
    }

    /// The declared endpoint specifications of a relationship, `(from, to)`.
    pub fn endpoints(&self, rel: &RelationshipSpec) -> Option<(&NodeSpec, &NodeSpec)> {
        Some((self.node(&rel.from_label)?, self.node(&rel.to_label)?))
    }

    /// The finance knowledge-graph schema: six node labels keyed on integer
    /// `id`, six relationship types.
    pub fn finance() -> Self {
        let id = || Identifier::from_static("id");
        let prop = |column: &str, property: &'static str, coercion: Coercion| {
            PropertyMapping::new(column, Identifier::from_static(property), coercion)
        };
        let node = |label: &'static str, table: &str, key: &str, properties| NodeSpec {
            label: Identifier::from_static(label),
            table: table.to_string(),
            key_column: key.to_string(),
            key_property: id(),
            key_coercion: Coercion::Integer,
            properties,
        };
        let rel = |rel_type: &'static str,
                   table: &str,
                   (from, from_key): (&'static str, &str),
                   (to, to_key): (&'static str, &str),
                   direction| RelationshipSpec {
            rel_type: Identifier::from_static(rel_type),
            table: table.to_string(),
            from_label: Identifier::from_static(from),
            from_key_column: from_key.to_string(),
            to_label: Identifier::from_static(to),
            to_key_column: to_key.to_string(),
            direction,
        };

        let nodes = vec![
            node(
                "Branch",
                "branches",
                "branch_id",
                vec![
                    prop("branch_name", "name", Coercion::String),
                    prop("location", "location", Coercion::String),
                ],
            ),
            node(
                "Employee",
                "employees",
                "employee_id",
                vec![
                    prop("employee_name", "name", Coercion::String),
                    prop("position", "position", Coercion::String),
                    prop("year_of_joining", "year_of_joining", Coercion::Integer),
                    prop("salary", "salary", Coercion::Float),
                ],
            ),
            node(
                "Customer",
                "customers",
                "customer_id",
                vec![
                    prop("name", "name", Coercion::String),
                    prop("phone", "phone", Coercion::String),
                    prop("email", "email", Coercion::String),
                    prop("date_joined", "date_joined", Coercion::Date),
                ],
            ),
            node(
                "Account",
                "accounts",
                "account_id",
                vec![
                    prop("balance", "balance", Coercion::Float),
                    prop("date_opened", "date_opened", Coercion::Date),
                ],
            ),
            node(
                "Transaction",
                "transactions",
                "transaction_id",
                vec![
                    prop("transaction_type", "transaction_type", Coercion::String),
                    prop("amount", "amount", Coercion::Float),
                    prop("date", "date", Coercion::DateTime),
                ],
            ),
            node(
                "Review",
                "reviews",
                "review_id",
                vec![
                    prop("review", "review", Coercion::String),
                    prop("date_submitted", "date_submitted", Coercion::Date),
                ],
            ),
        ];

        let relationships = vec![
            rel(
                "EMPLOYS",
                "employees",
                ("Branch", "branch_id"),
                ("Employee", "employee_id"),
                Direction::Forward,
            ),
            rel(
                "BELONGS_TO",
                "accounts",
                ("Account", "account_id"),
                ("Branch", "branch_id"),
                Direction::Forward,
            ),
            rel(
                "LINKED_WITH",
                "accounts",
                ("Account", "account_id"),
                ("Customer", "customer_id"),
                Direction::Reverse,
            ),
            rel(
                "PROCESSED_BY",
                "transactions",
                ("Transaction", "transaction_id"),
                ("Employee", "employee_id"),
                Direction::Forward,
            ),
            rel(
                "WRITTEN_BY",
                "reviews",
                ("Review", "review_id"),
                ("Customer", "customer_id"),
                Direction::Reverse,
            ),
            rel(
                "RECEIVED_ABOUT",
                "reviews",
                ("Review", "review_id"),
                ("Branch", "branch_id"),
                Direction::Forward,
            ),
        ];

        Self {
            nodes,
            relationships,
        }
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::finance()
    }
}
