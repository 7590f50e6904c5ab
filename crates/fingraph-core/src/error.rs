//! Error types for schema construction and graph store access

use thiserror::Error;

/// Errors raised while building or validating a [`SchemaRegistry`](crate::SchemaRegistry).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    #[error("invalid identifier {0:?}: expected [A-Za-z_][A-Za-z0-9_]*")]
    InvalidIdentifier(String),

    #[error("label {0} is declared more than once")]
    DuplicateLabel(String),

    #[error("relationship type {0} is declared more than once")]
    DuplicateRelationship(String),

    #[error("relationship {rel_type} references undeclared label {label}")]
    UnknownLabel { rel_type: String, label: String },

    #[error("label {label} cannot use {coercion} keys: key values must have exact equality")]
    UnsupportedKeyCoercion { label: String, coercion: String },

    #[error("{context}: column name must not be empty")]
    EmptyColumn { context: String },

    #[error("label {label} maps property {property} more than once")]
    DuplicateProperty { label: String, property: String },

    #[error("failed to parse schema definition: {0}")]
    Parse(String),
}

/// Errors surfaced by a [`GraphStore`](crate::GraphStore) backend.
#[derive(Error, Debug, Clone)]
pub enum GraphError {
    /// Store unreachable, connection dropped, or credentials rejected at connect time.
    #[error("connection error: {0}")]
    Connection(String),

    /// The store refused to create a schema constraint.
    #[error("constraint error on {label}: {message}")]
    Constraint { label: String, message: String },

    /// A statement failed for a reason that retrying will not fix.
    #[error("query failed: {0}")]
    Query(String),

    /// A result row could not be decoded.
    #[error("unexpected result shape: {0}")]
    Decode(String),

    /// Backend-specific transient failure (leader switch, deadlock, expired session).
    #[error("transient store error: {0}")]
    Transient(String),
}

impl GraphError {
    /// Whether the failure is an infrastructure hiccup that a fresh attempt may clear.
    pub fn is_transient(&self) -> bool {
        matches!(self, GraphError::Connection(_) | GraphError::Transient(_))
    }
}

/// Result alias for store operations.
pub type GraphResult<T> = Result<T, GraphError>;
