//! Constraint Installer

use fingraph_core::{GraphStore, NodeSpec};
use tracing::{info, warn};

use crate::error::EtlError;

/// Ensure a uniqueness constraint on the key property of every label.
///
/// Safe to call repeatedly. The first failure stops installation; it is never
/// downgraded, so a refused constraint surfaces as [`EtlError::Constraint`].
pub async fn ensure_constraints(store: &dyn GraphStore, nodes: &[NodeSpec]) -> Result<usize, EtlError> {
    let mut session = store.session().await?;

    let mut installed = 0;
    let mut outcome = Ok(());
    for spec in nodes {
        if let Err(err) = session
            .ensure_unique_constraint(&spec.label, &spec.key_property)
            .await
        {
            outcome = Err(err);
            break;
        }
        installed += 1;
    }

    if let Err(err) = session.close().await {
        warn!(error = %err, "failed to close constraint session");
    }
    outcome?;

    info!(labels = installed, "uniqueness constraints in place");
    Ok(installed)
}
