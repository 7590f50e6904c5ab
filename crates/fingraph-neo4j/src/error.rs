//! Mapping of driver failures onto [`GraphError`]

use fingraph_core::GraphError;

const CONNECTION_MARKERS: [&str; 9] = [
    "connection",
    "broken pipe",
    "reset",
    "io error",
    "authentication",
    "unauthorized",
    "unavailable",
    "timed out",
    "pool",
];

const TRANSIENT_MARKERS: [&str; 3] = ["transienterror", "deadlock", "session expired"];

/// Classify a driver error by its message.
///
/// The driver does not expose a stable error taxonomy across server versions,
/// so classification goes by the rendered text: transport and credential
/// failures become [`GraphError::Connection`], server transient codes become
/// [`GraphError::Transient`], everything else is a non-retryable
/// [`GraphError::Query`].
pub fn classify(message: impl Into<String>) -> GraphError {
    let message = message.into();
    let lowered = message.to_lowercase();

    if TRANSIENT_MARKERS.iter().any(|m| lowered.contains(m)) {
        GraphError::Transient(message)
    } else if CONNECTION_MARKERS.iter().any(|m| lowered.contains(m)) {
        GraphError::Connection(message)
    } else {
        GraphError::Query(message)
    }
}

pub(crate) fn from_driver(err: neo4rs::Error) -> GraphError {
    classify(err.to_string())
}

/// Constraint creation failures are never retried, whatever the message says,
/// unless the transport broke or the server reported a transient condition.
pub(crate) fn constraint_failure(label: &str, err: neo4rs::Error) -> GraphError {
    as_constraint_error(label, from_driver(err))
}

fn as_constraint_error(label: &str, err: GraphError) -> GraphError {
    match err {
        GraphError::Connection(message) => GraphError::Connection(message),
        GraphError::Transient(message) => GraphError::Transient(message),
        other => GraphError::Constraint {
            label: label.to_string(),
            message: other.to_string(),
        },
    }
}

/// An equivalent constraint under another name already guards the key.
pub(crate) fn is_equivalent_constraint(message: &str) -> bool {
    let lowered = message.to_lowercase();
    lowered.contains("equivalent") && lowered.contains("already exists")
}
