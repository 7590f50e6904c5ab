//! Shared fixtures for the pipeline tests

#![allow(dead_code)]

use async_trait::async_trait;
use fingraph_core::{
    EdgeMergeOutcome, EdgePattern, EdgeRow, GraphError, GraphResult, GraphSession, GraphStore,
    Identifier, MemoryGraphStore, NodeRef, NodeRow, SchemaRegistry, SchemaSnapshot,
};
use fingraph_etl::{CsvSource, LoadOptions, Orchestrator, RetryPolicy, SourceCatalog};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const BRANCHES: &str = "\
branch_id,branch_name,location
1,Main,NC
2,Harbor,SC
";

pub const EMPLOYEES: &str = "\
employee_id,branch_id,employee_name,position,year_of_joining,salary
10,1,Ada Lovelace,Manager,2015,91000.00
11,1,Grace Hopper,Teller,2019,48000.50
12,2,Alan Turing,Analyst,2021,67000
";

pub const CUSTOMERS: &str = "\
customer_id,name,phone,email,date_joined
100,Ann Lee,555-0100,ann@example.com,2019-04-02
101,Bo Chen,555-0101,bo@example.com,2020-07-15
";

pub const ACCOUNTS: &str = "\
account_id,customer_id,branch_id,balance,date_opened
1000,100,1,2500.75,2019-04-03
1001,101,2,130.00,2020-07-16
1002,101,1,9800.10,2021-01-09
";

pub const TRANSACTIONS: &str = "\
transaction_id,account_id,employee_id,transaction_type,amount,date
5000,1000,11,deposit,200.00,2023-01-05T10:30:00
5001,1001,12,withdrawal,50.25,2023-01-06 14:00:00
5002,1002,11,deposit,1000,2023-02-01T09:15:00Z
";

pub const REVIEWS: &str = "\
review_id,customer_id,branch_id,review,date_submitted
700,100,1,\"Friendly staff, quick service\",2023-03-01
701,101,2,Long wait times,2023-03-04
";

pub const FIXTURE_NODES: usize = 15;
pub const FIXTURE_EDGES: usize = 16;

/// The finance fixture, with `overrides` replacing whole tables.
pub fn fixture_tables(overrides: &[(&str, &str)]) -> BTreeMap<String, String> {
    let mut tables: BTreeMap<String, String> = [
        ("branches", BRANCHES),
        ("employees", EMPLOYEES),
        ("customers", CUSTOMERS),
        ("accounts", ACCOUNTS),
        ("transactions", TRANSACTIONS),
        ("reviews", REVIEWS),
    ]
    .into_iter()
    .map(|(table, text)| (table.to_string(), text.to_string()))
    .collect();
    for (table, text) in overrides {
        tables.insert(table.to_string(), text.to_string());
    }
    tables
}

pub fn catalog(overrides: &[(&str, &str)]) -> SourceCatalog {
    fixture_tables(overrides)
        .into_iter()
        .fold(SourceCatalog::new(), |catalog, (table, text)| {
            catalog.with(CsvSource::from_text(table, &text))
        })
}

pub fn orchestrator(store: Arc<dyn GraphStore>, catalog: SourceCatalog, max_attempts: u32) -> Orchestrator {
    Orchestrator::new(store, Arc::new(SchemaRegistry::finance()), catalog)
        .with_options(LoadOptions {
            batch_size: 2,
            node_concurrency: 3,
            max_error_samples: 5,
        })
        .with_retry(RetryPolicy::new(max_attempts, Duration::ZERO))
}

pub fn node(label: &'static str) -> NodeRef {
    NodeRef {
        label: Identifier::from_static(label),
        key_property: Identifier::from_static("id"),
    }
}

#[derive(Default)]
struct Faults {
    /// Connectivity checks still to fail.
    connect_failures: AtomicU32,
    connect_calls: AtomicU32,
    /// Labels whose constraint is refused.
    refused_constraints: HashSet<String>,
    /// Labels whose next node batch fails transiently, once each.
    flaky_labels: Mutex<HashSet<String>>,
    /// Delay added to every node batch.
    node_delay: Option<Duration>,
    /// Nodes in the store when the first relationship batch arrived.
    nodes_at_first_edge: Mutex<Option<usize>>,
}

/// A [`MemoryGraphStore`] that fails on demand.
#[derive(Clone)]
pub struct FaultyStore {
    inner: MemoryGraphStore,
    faults: Arc<Faults>,
}

pub struct FaultyStoreBuilder {
    faults: Faults,
}

impl FaultyStoreBuilder {
    pub fn failing_connects(mut self, n: u32) -> Self {
        self.faults.connect_failures = AtomicU32::new(n);
        self
    }

    pub fn refusing_constraint(mut self, label: &str) -> Self {
        self.faults.refused_constraints.insert(label.to_string());
        self
    }

    pub fn flaky_label(self, label: &str) -> Self {
        self.faults.flaky_labels.lock().insert(label.to_string());
        self
    }

    pub fn slow_nodes(mut self, delay: Duration) -> Self {
        self.faults.node_delay = Some(delay);
        self
    }

    pub fn build(self, inner: MemoryGraphStore) -> FaultyStore {
        FaultyStore {
            inner,
            faults: Arc::new(self.faults),
        }
    }
}

impl FaultyStore {
    pub fn builder() -> FaultyStoreBuilder {
        FaultyStoreBuilder {
            faults: Faults::default(),
        }
    }

    pub fn connect_calls(&self) -> u32 {
        self.faults.connect_calls.load(Ordering::SeqCst)
    }

    pub fn nodes_at_first_edge(&self) -> Option<usize> {
        *self.faults.nodes_at_first_edge.lock()
    }
}

#[async_trait]
impl GraphStore for FaultyStore {
    fn name(&self) -> &str {
        "faulty-memory"
    }

    async fn verify_connectivity(&self) -> GraphResult<()> {
        self.faults.connect_calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.faults.connect_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.faults
                .connect_failures
                .store(remaining - 1, Ordering::SeqCst);
            return Err(GraphError::Connection("connection refused".into()));
        }
        self.inner.verify_connectivity().await
    }

    async fn session(&self) -> GraphResult<Box<dyn GraphSession>> {
        Ok(Box::new(FaultySession {
            inner: self.inner.session().await?,
            store: self.inner.clone(),
            faults: Arc::clone(&self.faults),
        }))
    }

    async fn introspect(&self) -> GraphResult<SchemaSnapshot> {
        self.inner.introspect().await
    }
}

struct FaultySession {
    inner: Box<dyn GraphSession>,
    store: MemoryGraphStore,
    faults: Arc<Faults>,
}

#[async_trait]
impl GraphSession for FaultySession {
    async fn ensure_unique_constraint(
        &mut self,
        label: &Identifier,
        key_property: &Identifier,
    ) -> GraphResult<()> {
        if self.faults.refused_constraints.contains(label.as_str()) {
            return Err(GraphError::Constraint {
                label: label.to_string(),
                message: "conflicting constraint exists".into(),
            });
        }
        self.inner.ensure_unique_constraint(label, key_property).await
    }

    async fn merge_nodes(&mut self, target: &NodeRef, rows: &[NodeRow]) -> GraphResult<u64> {
        if let Some(delay) = self.faults.node_delay {
            tokio::time::sleep(delay).await;
        }
        let flaky = self.faults.flaky_labels.lock().remove(target.label.as_str());
        if flaky {
            return Err(GraphError::Transient("leader switch".into()));
        }
        self.inner.merge_nodes(target, rows).await
    }

    async fn merge_relationships(
        &mut self,
        pattern: &EdgePattern,
        rows: &[EdgeRow],
    ) -> GraphResult<EdgeMergeOutcome> {
        {
            let mut seen = self.faults.nodes_at_first_edge.lock();
            if seen.is_none() {
                *seen = Some(self.store.total_nodes());
            }
        }
        self.inner.merge_relationships(pattern, rows).await
    }

    async fn close(self: Box<Self>) -> GraphResult<()> {
        self.inner.close().await
    }
}
