//! Cypher statement rendering.
//!
//! Statements are rendered from validated specifications, never from raw
//! text: identifiers are quoted with backticks and every value travels as a
//! parameter. Batch statements take a single `$rows` list whose element shape
//! is documented on each builder.

use crate::schema::Identifier;
use crate::store::{EdgePattern, NodeRef};

/// Name of the list parameter consumed by the batch statements.
pub const ROWS_PARAM: &str = "rows";

/// A rendered statement and the parameters it expects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub text: String,
    pub params: Vec<&'static str>,
}

impl Statement {
    fn new(text: String, params: Vec<&'static str>) -> Self {
        Self { text, params }
    }
}

/// Quote an identifier for use as a label, type or property name.
pub fn quote(identifier: &Identifier) -> String {
    format!("`{}`", identifier.as_str().replace('`', "``"))
}

/// Deterministic constraint name, so repeated runs address the same constraint.
pub fn constraint_name(label: &Identifier, key_property: &Identifier) -> String {
    format!(
        "{}_{}_unique",
        label.as_str().to_lowercase(),
        key_property.as_str().to_lowercase()
    )
}

/// `CREATE CONSTRAINT ... IF NOT EXISTS` for a label's key property.
pub fn unique_constraint(label: &Identifier, key_property: &Identifier) -> Statement {
    Statement::new(
        format!(
            "CREATE CONSTRAINT `{}` IF NOT EXISTS FOR (n:{}) REQUIRE n.{} IS UNIQUE",
            constraint_name(label, key_property),
            quote(label),
            quote(key_property),
        ),
        Vec::new(),
    )
}

/// Merge a batch of nodes by key.
///
/// Row shape: `{key: <key value>, props: {<property>: <value>, ...}}`.
/// `SET n += row.props` touches only the provided properties; properties the
/// mapping does not mention are never removed.
pub fn merge_nodes(target: &NodeRef) -> Statement {
    Statement::new(
        format!(
            "UNWIND ${ROWS_PARAM} AS row \
             MERGE (n:{label} {{{key}: row.key}}) \
             SET n += row.props \
             RETURN count(n) AS written",
            label = quote(&target.label),
            key = quote(&target.key_property),
        ),
        vec![ROWS_PARAM],
    )
}

/// Merge a batch of edges between existing nodes.
///
/// Row shape: `{idx: <batch position>, start: <key>, end: <key>}`. Both
/// endpoints are `MATCH`ed, so a missing node drops the row instead of
/// creating a node; the returned `idx` values are the rows that resolved.
pub fn merge_relationships(pattern: &EdgePattern) -> Statement {
    Statement::new(
        format!(
            "UNWIND ${ROWS_PARAM} AS row \
             MATCH (a:{start_label} {{{start_key}: row.start}}) \
             MATCH (b:{end_label} {{{end_key}: row.end}}) \
             MERGE (a)-[:{rel_type}]->(b) \
             RETURN row.idx AS idx",
            start_label = quote(&pattern.start.label),
            start_key = quote(&pattern.start.key_property),
            end_label = quote(&pattern.end.label),
            end_key = quote(&pattern.end.key_property),
            rel_type = quote(&pattern.rel_type),
        ),
        vec![ROWS_PARAM],
    )
}

/// Node counts per label.
pub fn label_counts() -> Statement {
    Statement::new(
        "MATCH (n) UNWIND labels(n) AS label RETURN label, count(*) AS count".to_string(),
        Vec::new(),
    )
}

/// Property names observed per label.
pub fn label_properties() -> Statement {
    Statement::new(
        "MATCH (n) UNWIND labels(n) AS label UNWIND keys(n) AS property \
         RETURN DISTINCT label, property"
            .to_string(),
        Vec::new(),
    )
}

/// Edge counts per relationship type and endpoint label pair.
pub fn relationship_patterns() -> Statement {
    Statement::new(
        "MATCH (a)-[r]->(b) \
         RETURN type(r) AS rel_type, head(labels(a)) AS start, head(labels(b)) AS end, \
         count(*) AS count"
            .to_string(),
        Vec::new(),
    )
}
