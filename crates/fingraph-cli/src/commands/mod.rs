pub mod load;
pub mod schema;
pub mod verify;

use anyhow::{Context, Result};
use fingraph_config::EtlConfig;
use fingraph_core::SchemaRegistry;
use std::process::ExitCode;
use tracing::info;

use crate::cli::Commands;

/// Exit status of a run that ended in `FAILED` or found drift.
pub const EXIT_FAILED: u8 = 1;

/// Run one subcommand. `Err` means the run could not be set up.
pub async fn execute(command: Commands, config: &EtlConfig) -> Result<ExitCode> {
    match command {
        Commands::Load {
            dry_run,
            deadline,
            verify,
            json,
        } => load::execute(config, dry_run, deadline, verify, json).await,
        Commands::Verify { json } => verify::execute(config, json).await,
        Commands::Schema { cypher } => schema::execute(config, cypher),
    }
}

/// The configured schema file, or the built-in finance schema.
pub fn load_registry(config: &EtlConfig) -> Result<SchemaRegistry> {
    let Some(path) = &config.schema_file else {
        return Ok(SchemaRegistry::finance());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read schema file {}", path.display()))?;
    let registry = SchemaRegistry::from_toml(&text)
        .with_context(|| format!("invalid schema file {}", path.display()))?;
    info!(
        path = %path.display(),
        labels = registry.nodes().len(),
        relationships = registry.relationships().len(),
        "loaded schema file"
    );
    Ok(registry)
}
