use anyhow::Result;
use fingraph_config::EtlConfig;
use fingraph_core::{GraphStore, MemoryGraphStore};
use fingraph_etl::{
    verify_graph, LoadOptions, Orchestrator, RetryPolicy, RunReport, SourceCatalog,
};
use fingraph_neo4j::Neo4jStore;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::{load_registry, EXIT_FAILED};
use crate::output::{drift_table, run_table, sample_lines};

pub async fn execute(
    config: &EtlConfig,
    dry_run: bool,
    deadline_secs: Option<u64>,
    verify: bool,
    json: bool,
) -> Result<ExitCode> {
    let registry = Arc::new(load_registry(config)?);
    let catalog = SourceCatalog::from_config(&config.sources, &registry);

    let store: Arc<dyn GraphStore> = if dry_run {
        info!("dry run: loading into an in-memory graph");
        Arc::new(MemoryGraphStore::new())
    } else {
        Arc::new(Neo4jStore::new(&config.neo4j))
    };
    let deadline = match deadline_secs {
        Some(0) => None,
        Some(secs) => Some(Duration::from_secs(secs)),
        None => config.load.deadline(),
    };

    let orchestrator = Orchestrator::new(Arc::clone(&store), Arc::clone(&registry), catalog)
        .with_options(LoadOptions::from(&config.load))
        .with_retry(RetryPolicy::from(&config.retry))
        .with_deadline(deadline);

    let cancel = orchestrator.cancellation();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, stopping at the next batch boundary");
            cancel.cancel();
        }
    });
    let outcome = orchestrator.run().await;
    interrupt.abort();

    let report = match outcome {
        Ok(report) => report,
        Err(failure) => {
            print_report(&failure.report, json)?;
            eprintln!("{failure}");
            return Ok(ExitCode::from(EXIT_FAILED));
        }
    };
    print_report(&report, json)?;

    if verify {
        match verify_graph(store.as_ref(), &registry).await {
            Ok(drift) if drift.is_empty() => {}
            Ok(drift) => {
                println!("{}", drift_table(&drift));
                return Ok(ExitCode::from(EXIT_FAILED));
            }
            Err(err) => {
                eprintln!("schema verification failed: {err}");
                return Ok(ExitCode::from(EXIT_FAILED));
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn print_report(report: &RunReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    println!("{}", run_table(report));
    let samples = sample_lines(report);
    if !samples.is_empty() {
        println!("\nSkipped rows (sample):");
        for line in samples {
            println!("  {line}");
        }
    }
    Ok(())
}
