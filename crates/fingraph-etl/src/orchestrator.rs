//! Ingestion Orchestrator

use futures::stream::{self, StreamExt};
use fingraph_core::{GraphStore, SchemaError, SchemaRegistry};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};

use crate::constraints::ensure_constraints;
use crate::error::EtlError;
use crate::nodes::load_nodes_into;
use crate::options::LoadOptions;
use crate::relationships::load_relationships_into;
use crate::report::{LoadCount, LoadRun, Phase, RunFailure, RunReport, Stage};
use crate::retry::RetryPolicy;
use crate::source::SourceCatalog;

/// Runs constraint installation, then every node load, then every
/// relationship load, retrying the whole sequence on transient failures.
pub struct Orchestrator {
    store: Arc<dyn GraphStore>,
    registry: Arc<SchemaRegistry>,
    catalog: SourceCatalog,
    options: LoadOptions,
    retry: RetryPolicy,
    cancel: CancellationToken,
    deadline: Option<Duration>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn GraphStore>,
        registry: Arc<SchemaRegistry>,
        catalog: SourceCatalog,
    ) -> Self {
        Self {
            store,
            registry,
            catalog,
            options: LoadOptions::default(),
            retry: RetryPolicy::default(),
            cancel: CancellationToken::new(),
            deadline: None,
        }
    }

    pub fn with_options(mut self, options: LoadOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Cancel the run from outside. Checked between batches and phases.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Give up once `deadline` has elapsed since [`Orchestrator::run`] began,
    /// retries included.
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Drive the pipeline to `RelationshipsLoaded`, or to `Failed` once the
    /// retry budget is spent or a non-retryable error occurs.
    pub async fn run(&self) -> Result<RunReport, RunFailure> {
        let cancel = self.cancel.child_token();
        let deadline_at = self.deadline.map(|d| Instant::now() + d);
        let watchdog = deadline_at.map(|at| {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep_until(at) => cancel.cancel(),
                    _ = cancel.cancelled() => {}
                }
            })
        });

        let result = self.run_attempts(&cancel, deadline_at).await;

        cancel.cancel();
        if let Some(watchdog) = watchdog {
            watchdog.abort();
        }
        result
    }

    async fn run_attempts(
        &self,
        cancel: &CancellationToken,
        deadline_at: Option<Instant>,
    ) -> Result<RunReport, RunFailure> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let run = LoadRun::new(attempt);
            let span = info_span!("attempt", attempt, max = self.retry.max_attempts());

            let outcome = self.run_once(&run, cancel).instrument(span).await;
            let error = match outcome {
                Ok(()) => {
                    let report = run.report(attempt);
                    info!(
                        attempts = attempt,
                        nodes = report.nodes_loaded(),
                        relationships = report.relationships_loaded(),
                        skipped = report.rows_skipped(),
                        "load complete"
                    );
                    return Ok(report);
                }
                Err(EtlError::Cancelled) if deadline_passed(deadline_at) => {
                    EtlError::DeadlineExceeded
                }
                Err(err) => err,
            };

            let during = run.fail();
            if self.retry.should_retry(&error, attempt) {
                warn!(
                    attempt,
                    max_attempts = self.retry.max_attempts(),
                    delay = ?self.retry.delay(),
                    %during,
                    %error,
                    "attempt failed, retrying"
                );
                if self.retry.pause(cancel).await {
                    continue;
                }
                let error = if deadline_passed(deadline_at) {
                    EtlError::DeadlineExceeded
                } else {
                    EtlError::Cancelled
                };
                return Err(RunFailure {
                    error,
                    report: run.report(attempt),
                });
            }

            error!(attempts = attempt, %during, %error, "load failed");
            return Err(RunFailure {
                error,
                report: run.report(attempt),
            });
        }
    }

    async fn run_once(&self, run: &LoadRun, cancel: &CancellationToken) -> Result<(), EtlError> {
        let store = self.store.as_ref();

        run.enter(Stage::Connecting);
        checkpoint(cancel)?;
        store.verify_connectivity().await?;
        info!(store = store.name(), attempt = run.attempt(), "store reachable");

        run.enter(Stage::InstallingConstraints);
        checkpoint(cancel)?;
        ensure_constraints(store, self.registry.nodes()).await?;
        run.advance(Phase::ConstraintsInstalled);

        run.enter(Stage::LoadingNodes);
        checkpoint(cancel)?;
        self.load_all_nodes(run, cancel).await?;
        run.advance(Phase::NodesLoaded);
        info!(labels = self.registry.nodes().len(), "node phase complete");

        run.enter(Stage::LoadingRelationships);
        checkpoint(cancel)?;
        self.load_all_relationships(run, cancel).await?;
        run.advance(Phase::RelationshipsLoaded);

        Ok(())
    }

    /// Every label, at most `node_concurrency` at a time. Returns only after all
    /// of them have finished, successfully or not. Rows written by a failed
    /// load are still recorded.
    async fn load_all_nodes(&self, run: &LoadRun, cancel: &CancellationToken) -> Result<(), EtlError> {
        let store = self.store.as_ref();
        let options = &self.options;

        let results: Vec<Result<(), EtlError>> = stream::iter(self.registry.nodes())
            .map(|spec| async move {
                let source = self
                    .catalog
                    .get(&spec.table)
                    .map_err(|e| EtlError::source_missing(&spec.table, e))?;
                let mut count = LoadCount::default();
                let outcome = load_nodes_into(store, spec, source, options, cancel, &mut count)
                    .instrument(info_span!("nodes", label = %spec.label))
                    .await;
                run.record_nodes(spec.label.as_str(), count);
                outcome
            })
            .buffer_unordered(options.node_concurrency)
            .collect()
            .await;

        first_failure(results, &self.retry)
    }

    /// Relationship types one after another.
    async fn load_all_relationships(
        &self,
        run: &LoadRun,
        cancel: &CancellationToken,
    ) -> Result<(), EtlError> {
        let store = self.store.as_ref();
        for spec in self.registry.relationships() {
            let endpoints = self.registry.endpoints(spec).ok_or_else(|| {
                SchemaError::UnknownLabel {
                    rel_type: spec.rel_type.to_string(),
                    label: format!("{} or {}", spec.from_label, spec.to_label),
                }
            })?;
            let source = self
                .catalog
                .get(&spec.table)
                .map_err(|e| EtlError::source_missing(&spec.table, e))?;
            let mut count = LoadCount::default();
            let outcome = load_relationships_into(
                store,
                spec,
                endpoints,
                source,
                &self.options,
                cancel,
                &mut count,
            )
            .instrument(info_span!("relationships", rel_type = %spec.rel_type))
            .await;
            run.record_relationships(spec.rel_type.as_str(), count);
            outcome?;
        }
        Ok(())
    }
}

fn checkpoint(cancel: &CancellationToken) -> Result<(), EtlError> {
    if cancel.is_cancelled() {
        Err(EtlError::Cancelled)
    } else {
        Ok(())
    }
}

fn deadline_passed(deadline_at: Option<Instant>) -> bool {
    deadline_at.is_some_and(|at| Instant::now() >= at)
}

/// Report a non-retryable failure in preference to a retryable one, so one
/// broken source is not masked by a sibling's transient error.
fn first_failure(results: Vec<Result<(), EtlError>>, retry: &RetryPolicy) -> Result<(), EtlError> {
    let mut errors: Vec<EtlError> = results.into_iter().filter_map(Result::err).collect();
    if errors.is_empty() {
        return Ok(());
    }
    let position = errors
        .iter()
        .position(|e| !retry.is_retryable(e))
        .unwrap_or(0);
    Err(errors.swap_remove(position))
}
