use anyhow::Result;
use fingraph_config::EtlConfig;
use fingraph_etl::verify_graph;
use fingraph_neo4j::Neo4jStore;
use std::process::ExitCode;

use super::{load_registry, EXIT_FAILED};
use crate::output::drift_table;

pub async fn execute(config: &EtlConfig, json: bool) -> Result<ExitCode> {
    let registry = load_registry(config)?;
    let store = Neo4jStore::new(&config.neo4j);

    let drift = match verify_graph(&store, &registry).await {
        Ok(drift) => drift,
        Err(err) => {
            eprintln!("cannot inspect {}: {err}", config.neo4j.uri);
            return Ok(ExitCode::from(EXIT_FAILED));
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&drift)?);
    } else {
        println!("{}", drift_table(&drift));
    }
    Ok(if drift.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_FAILED)
    })
}
