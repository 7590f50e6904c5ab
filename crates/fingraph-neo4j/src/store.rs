use async_trait::async_trait;
use fingraph_config::Neo4jConfig;
use fingraph_core::cypher::{self, Statement, ROWS_PARAM};
use fingraph_core::{
    EdgeMergeOutcome, EdgePattern, EdgeRow, GraphError, GraphResult, GraphSession, GraphStore,
    Identifier, NodeRef, NodeRow, SchemaSnapshot,
};
use neo4rs::{query, BoltType, ConfigBuilder, Graph, Query, Row};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::convert;
use crate::error::{constraint_failure, from_driver, is_equivalent_constraint};

/// Neo4j over Bolt. Clones share one connection pool.
///
/// The pool is built on first use, so an unreachable server surfaces as a
/// [`GraphError::Connection`] from [`GraphStore::verify_connectivity`] rather
/// than at construction.
#[derive(Clone)]
pub struct Neo4jStore {
    config: Arc<Neo4jConfig>,
    graph: Arc<OnceCell<Graph>>,
}

impl Neo4jStore {
    pub fn new(config: &Neo4jConfig) -> Self {
        Self {
            config: Arc::new(config.clone()),
            graph: Arc::new(OnceCell::new()),
        }
    }

    async fn graph(&self) -> GraphResult<&Graph> {
        self.graph
            .get_or_try_init(|| async {
                let config = &self.config;
                let driver_config = ConfigBuilder::default()
                    .uri(config.uri.as_str())
                    .user(config.username.as_str())
                    .password(config.password.as_str())
                    .db(config.database.as_str())
                    .max_connections(config.max_connections)
                    .build()
                    .map_err(|e| GraphError::Connection(e.to_string()))?;

                let graph = Graph::connect(driver_config)
                    .await
                    .map_err(|e| GraphError::Connection(e.to_string()))?;
                info!(uri = %config.uri, database = %config.database, "connected to neo4j");
                Ok(graph)
            })
            .await
    }

    async fn fetch(&self, statement: Statement) -> GraphResult<Vec<Row>> {
        let mut stream = self
            .graph()
            .await?
            .execute(query(&statement.text))
            .await
            .map_err(from_driver)?;
        let mut rows = Vec::new();
        while let Some(row) = stream.next().await.map_err(from_driver)? {
            rows.push(row);
        }
        Ok(rows)
    }
}

impl std::fmt::Debug for Neo4jStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Neo4jStore")
            .field("config", &self.config)
            .field("connected", &self.graph.initialized())
            .finish()
    }
}

fn text(row: &Row, column: &str) -> GraphResult<String> {
    row.get::<String>(column)
        .map_err(|e| GraphError::Decode(format!("column {column}: {e}")))
}

fn integer(row: &Row, column: &str) -> GraphResult<i64> {
    row.get::<i64>(column)
        .map_err(|e| GraphError::Decode(format!("column {column}: {e}")))
}

fn count(row: &Row, column: &str) -> GraphResult<u64> {
    let value = integer(row, column)?;
    u64::try_from(value).map_err(|_| GraphError::Decode(format!("negative {column}: {value}")))
}

fn batch(statement: Statement, rows: Vec<HashMap<String, BoltType>>) -> Query {
    query(&statement.text).param(ROWS_PARAM, rows)
}

#[async_trait]
impl GraphStore for Neo4jStore {
    fn name(&self) -> &str {
        "neo4j"
    }

    async fn verify_connectivity(&self) -> GraphResult<()> {
        self.graph()
            .await?
            .run(query("RETURN 1"))
            .await
            .map_err(|e| GraphError::Connection(e.to_string()))
    }

    async fn session(&self) -> GraphResult<Box<dyn GraphSession>> {
        let graph = self.graph().await?.clone();
        Ok(Box::new(Neo4jSession { graph }))
    }

    async fn introspect(&self) -> GraphResult<SchemaSnapshot> {
        let mut snapshot = SchemaSnapshot::default();

        for row in self.fetch(cypher::label_counts()).await? {
            let label = text(&row, "label")?;
            snapshot.labels.entry(label).or_default().count = count(&row, "count")?;
        }

        for row in self.fetch(cypher::label_properties()).await? {
            let label = text(&row, "label")?;
            let property = text(&row, "property")?;
            snapshot
                .labels
                .entry(label)
                .or_default()
                .properties
                .insert(property);
        }

        for row in self.fetch(cypher::relationship_patterns()).await? {
            let rel_type = text(&row, "rel_type")?;
            let start = text(&row, "start")?;
            let end = text(&row, "end")?;
            let summary = snapshot.relationships.entry(rel_type).or_default();
            summary.count += count(&row, "count")?;
            summary.endpoints.insert((start, end));
        }

        Ok(snapshot)
    }
}

/// Sessions borrow connections from the pool per statement, so closing only
/// drops the handle.
struct Neo4jSession {
    graph: Graph,
}

#[async_trait]
impl GraphSession for Neo4jSession {
    async fn ensure_unique_constraint(
        &mut self,
        label: &Identifier,
        key_property: &Identifier,
    ) -> GraphResult<()> {
        let statement = cypher::unique_constraint(label, key_property);
        debug!(statement = %statement.text, "ensuring constraint");

        match self.graph.run(query(&statement.text)).await {
            Ok(()) => Ok(()),
            Err(e) if is_equivalent_constraint(&e.to_string()) => {
                debug!(%label, "equivalent constraint already present");
                Ok(())
            }
            Err(e) => Err(constraint_failure(label.as_str(), e)),
        }
    }

    async fn merge_nodes(&mut self, target: &NodeRef, rows: &[NodeRow]) -> GraphResult<u64> {
        if rows.is_empty() {
            return Ok(0);
        }
        let q = batch(cypher::merge_nodes(target), convert::node_rows(rows));
        let mut stream = self.graph.execute(q).await.map_err(from_driver)?;

        let mut written = 0;
        while let Some(row) = stream.next().await.map_err(from_driver)? {
            written += count(&row, "written")?;
        }
        Ok(written)
    }

    async fn merge_relationships(
        &mut self,
        pattern: &EdgePattern,
        rows: &[EdgeRow],
    ) -> GraphResult<EdgeMergeOutcome> {
        if rows.is_empty() {
            return Ok(EdgeMergeOutcome::default());
        }
        let q = batch(cypher::merge_relationships(pattern), convert::edge_rows(rows));
        let mut stream = self.graph.execute(q).await.map_err(from_driver)?;

        let mut resolved = BTreeSet::new();
        while let Some(row) = stream.next().await.map_err(from_driver)? {
            let idx = integer(&row, "idx")?;
            resolved.insert(idx);
        }

        let unresolved = (0..rows.len())
            .filter(|idx| !resolved.contains(&(*idx as i64)))
            .collect();
        Ok(EdgeMergeOutcome {
            merged: resolved.len() as u64,
            unresolved,
        })
    }

    async fn close(self: Box<Self>) -> GraphResult<()> {
        Ok(())
    }
}
