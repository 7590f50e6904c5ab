//! Error types for loading

use fingraph_core::{CoercionError, GraphError, SchemaError};
use std::path::PathBuf;
use thiserror::Error;

/// Failures opening or reading a tabular source. Fatal to the load that hit
/// them.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("no source is configured for table {table}")]
    Undeclared { table: String },

    #[error("cannot read {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("table {table} has an unreadable header: {message}")]
    Header { table: String, message: String },

    #[error("table {table} is missing required columns: {}", columns.join(", "))]
    MissingColumns { table: String, columns: Vec<String> },

    #[error("reading table {table} failed at line {line}: {source}")]
    Read {
        table: String,
        line: u64,
        #[source]
        source: std::io::Error,
    },

    #[error("reader for table {table} stopped unexpectedly")]
    Interrupted { table: String },
}

/// A single row that could not be turned into a write. Counted and sampled,
/// never propagated.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RowError {
    #[error("line {line}: column {column}: {source}")]
    Coercion {
        line: u64,
        column: String,
        #[source]
        source: CoercionError,
    },

    #[error("line {line}: key column {column} is empty")]
    MissingKey { line: u64, column: String },

    #[error("line {line}: malformed record: {message}")]
    Malformed { line: u64, message: String },

    #[error("line {line}: no node for endpoint {start} -> {end}")]
    UnresolvedEndpoint { line: u64, start: String, end: String },
}

impl RowError {
    /// Short category name for summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            RowError::Coercion { .. } => "coercion",
            RowError::MissingKey { .. } => "missing key",
            RowError::Malformed { .. } => "malformed",
            RowError::UnresolvedEndpoint { .. } => "unresolved endpoint",
        }
    }

    pub fn line(&self) -> u64 {
        match self {
            RowError::Coercion { line, .. }
            | RowError::MissingKey { line, .. }
            | RowError::Malformed { line, .. }
            | RowError::UnresolvedEndpoint { line, .. } => *line,
        }
    }
}

/// Phase-level failures. Any of these ends the current attempt.
#[derive(Error, Debug)]
pub enum EtlError {
    /// Store unreachable, credentials rejected, or another transient store fault.
    #[error("connection error: {0}")]
    Connection(String),

    #[error("constraint on {label} could not be installed: {message}")]
    Constraint { label: String, message: String },

    #[error("source for {table} unavailable: {source}")]
    SourceMissing {
        table: String,
        #[source]
        source: SourceError,
    },

    /// Non-transient store failure during a load.
    #[error("store error: {0}")]
    Store(GraphError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("run cancelled")]
    Cancelled,

    #[error("run deadline exceeded")]
    DeadlineExceeded,
}

impl EtlError {
    pub fn source_missing(table: impl Into<String>, source: SourceError) -> Self {
        EtlError::SourceMissing {
            table: table.into(),
            source,
        }
    }

    /// Whether a fresh attempt of the whole run may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, EtlError::Connection(_))
    }
}

impl From<GraphError> for EtlError {
    fn from(err: GraphError) -> Self {
        match err {
            GraphError::Connection(message) | GraphError::Transient(message) => {
                EtlError::Connection(message)
            }
            GraphError::Constraint { label, message } => EtlError::Constraint { label, message },
            other => EtlError::Store(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_connection_failures_are_transient() {
        assert!(EtlError::from(GraphError::Connection("refused".into())).is_transient());
        assert!(EtlError::from(GraphError::Transient("deadlock".into())).is_transient());
        assert!(!EtlError::from(GraphError::Constraint {
            label: "Branch".into(),
            message: "denied".into(),
        })
        .is_transient());
        assert!(!EtlError::from(GraphError::Query("syntax".into())).is_transient());
        assert!(!EtlError::source_missing(
            "branches",
            SourceError::Undeclared {
                table: "branches".into()
            }
        )
        .is_transient());
        assert!(!EtlError::Cancelled.is_transient());
    }

    #[test]
    fn row_errors_report_kind_and_line() {
        let err = RowError::MissingKey {
            line: 7,
            column: "branch_id".into(),
        };
        assert_eq!(err.kind(), "missing key");
        assert_eq!(err.line(), 7);
        assert_eq!(err.to_string(), "line 7: key column branch_id is empty");
    }
}
