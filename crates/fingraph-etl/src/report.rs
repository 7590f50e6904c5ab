//! Run progress and outcome

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{EtlError, RowError};

/// Rows written and rows skipped by one load.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoadCount {
    /// Nodes upserted, or edges created or confirmed.
    pub loaded: u64,
    pub skipped: u64,
    /// Skip totals per [`RowError::kind`].
    pub skipped_by_kind: BTreeMap<&'static str, u64>,
    /// The first few skipped rows, for diagnostics.
    #[serde(skip)]
    pub samples: Vec<RowError>,
}

impl LoadCount {
    /// Count a skipped row, keeping it as a sample while there is room.
    pub fn skip(&mut self, err: RowError, max_samples: usize) {
        self.skipped += 1;
        *self.skipped_by_kind.entry(err.kind()).or_default() += 1;
        if self.samples.len() < max_samples {
            self.samples.push(err);
        }
    }

    /// Whether the next skipped row would still be sampled.
    pub fn sampling(&self, max_samples: usize) -> bool {
        self.samples.len() < max_samples
    }

    pub fn skipped_of(&self, kind: &str) -> u64 {
        self.skipped_by_kind.get(kind).copied().unwrap_or_default()
    }
}

/// The part of the pipeline being worked on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Connecting,
    InstallingConstraints,
    LoadingNodes,
    LoadingRelationships,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Connecting => "connecting",
            Stage::InstallingConstraints => "installing constraints",
            Stage::LoadingNodes => "loading nodes",
            Stage::LoadingRelationships => "loading relationships",
        };
        f.write_str(name)
    }
}

/// Run state. `RelationshipsLoaded` is the only successful terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    NotStarted,
    ConstraintsInstalled,
    NodesLoaded,
    RelationshipsLoaded,
    Failed { during: Stage },
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::RelationshipsLoaded | Phase::Failed { .. })
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::NotStarted => f.write_str("not started"),
            Phase::ConstraintsInstalled => f.write_str("constraints installed"),
            Phase::NodesLoaded => f.write_str("nodes loaded"),
            Phase::RelationshipsLoaded => f.write_str("relationships loaded"),
            Phase::Failed { during } => write!(f, "failed while {during}"),
        }
    }
}

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    /// Attempts made, including the last one.
    pub attempts: u32,
    pub phase: Phase,
    /// Per label, from the last attempt.
    pub nodes: BTreeMap<String, LoadCount>,
    /// Per relationship type, from the last attempt.
    pub relationships: BTreeMap<String, LoadCount>,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.phase == Phase::RelationshipsLoaded
    }

    pub fn nodes_loaded(&self) -> u64 {
        self.nodes.values().map(|c| c.loaded).sum()
    }

    pub fn relationships_loaded(&self) -> u64 {
        self.relationships.values().map(|c| c.loaded).sum()
    }

    pub fn rows_skipped(&self) -> u64 {
        self.nodes
            .values()
            .chain(self.relationships.values())
            .map(|c| c.skipped)
            .sum()
    }
}

/// A run that ended in `FAILED`: the error that ended it and what had been
/// loaded by then.
#[derive(Debug)]
pub struct RunFailure {
    pub error: EtlError,
    pub report: RunReport,
}

impl fmt::Display for RunFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "load {} after {} attempt(s): {} ({} nodes, {} relationships loaded before failure)",
            self.report.phase,
            self.report.attempts,
            self.error,
            self.report.nodes_loaded(),
            self.report.relationships_loaded(),
        )
    }
}

impl std::error::Error for RunFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// One attempt's mutable state. Loads running concurrently record into it.
#[derive(Debug)]
pub(crate) struct LoadRun {
    attempt: u32,
    phase: Mutex<Phase>,
    stage: Mutex<Stage>,
    nodes: Mutex<BTreeMap<String, LoadCount>>,
    relationships: Mutex<BTreeMap<String, LoadCount>>,
}

impl LoadRun {
    pub(crate) fn new(attempt: u32) -> Self {
        Self {
            attempt,
            phase: Mutex::new(Phase::NotStarted),
            stage: Mutex::new(Stage::Connecting),
            nodes: Mutex::new(BTreeMap::new()),
            relationships: Mutex::new(BTreeMap::new()),
        }
    }

    pub(crate) fn attempt(&self) -> u32 {
        self.attempt
    }

    pub(crate) fn phase(&self) -> Phase {
        *self.phase.lock()
    }

    pub(crate) fn advance(&self, phase: Phase) {
        *self.phase.lock() = phase;
    }

    pub(crate) fn enter(&self, stage: Stage) {
        *self.stage.lock() = stage;
    }

    /// Move to `Failed`, remembering the stage that was in progress.
    pub(crate) fn fail(&self) -> Stage {
        let during = *self.stage.lock();
        *self.phase.lock() = Phase::Failed { during };
        during
    }

    pub(crate) fn record_nodes(&self, label: &str, count: LoadCount) {
        self.nodes.lock().insert(label.to_string(), count);
    }

    pub(crate) fn record_relationships(&self, rel_type: &str, count: LoadCount) {
        self.relationships.lock().insert(rel_type.to_string(), count);
    }

    pub(crate) fn report(&self, attempts: u32) -> RunReport {
        RunReport {
            attempts,
            phase: self.phase(),
            nodes: self.nodes.lock().clone(),
            relationships: self.relationships.lock().clone(),
        }
    }
}
