//! Relationship Loader

use fingraph_core::{
    Coercion, Direction, EdgePattern, EdgeRow, GraphSession, GraphStore, NodeSpec,
    RelationshipSpec,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{EtlError, RowError};
use crate::nodes::key_cell;
use crate::options::LoadOptions;
use crate::report::LoadCount;
use crate::source::{ColumnIndex, Record, RowBatches, SourceRow, TabularSource};

/// Merge one edge per row of `source` between two already-loaded nodes.
///
/// `from` and `to` are the node specifications named by `spec`; their key
/// coercions apply to the endpoint columns. A row whose endpoint does not
/// exist is skipped as unresolved; endpoints are never created.
pub async fn load_relationships(
    store: &dyn GraphStore,
    spec: &RelationshipSpec,
    endpoints: (&NodeSpec, &NodeSpec),
    source: Arc<dyn TabularSource>,
    options: &LoadOptions,
    cancel: &CancellationToken,
) -> Result<LoadCount, EtlError> {
    let mut count = LoadCount::default();
    load_relationships_into(store, spec, endpoints, source, options, cancel, &mut count).await?;
    Ok(count)
}

/// [`load_relationships`], accumulating into `count` so edges already merged
/// are still counted when the load fails part way.
pub(crate) async fn load_relationships_into(
    store: &dyn GraphStore,
    spec: &RelationshipSpec,
    (from, to): (&NodeSpec, &NodeSpec),
    source: Arc<dyn TabularSource>,
    options: &LoadOptions,
    cancel: &CancellationToken,
    count: &mut LoadCount,
) -> Result<(), EtlError> {
    let mut batches = RowBatches::open(source, options.batch_size)
        .await
        .map_err(|e| EtlError::source_missing(&spec.table, e))?;
    let columns = ColumnIndex::resolve(&spec.table, batches.columns(), &spec.required_columns())
        .map_err(|e| EtlError::source_missing(&spec.table, e))?;
    let mapper = EdgeMapper::new(spec, from, to, &columns);
    let pattern = EdgePattern::resolve(spec, from, to);

    let mut session = store.session().await?;
    let outcome = drive(
        session.as_mut(),
        spec,
        &pattern,
        &mapper,
        &mut batches,
        options,
        cancel,
        count,
    )
    .await;
    if let Err(err) = session.close().await {
        warn!(rel_type = %spec.rel_type, error = %err, "failed to close session");
    }

    if let Err(err) = outcome {
        warn!(
            rel_type = %spec.rel_type,
            loaded = count.loaded,
            skipped = count.skipped,
            error = %err,
            "relationship load stopped"
        );
        return Err(err);
    }
    info!(
        rel_type = %spec.rel_type,
        loaded = count.loaded,
        skipped = count.skipped,
        unresolved = count.skipped_of("unresolved endpoint"),
        "loaded relationships"
    );
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn drive(
    session: &mut dyn GraphSession,
    spec: &RelationshipSpec,
    pattern: &EdgePattern,
    mapper: &EdgeMapper,
    batches: &mut RowBatches,
    options: &LoadOptions,
    cancel: &CancellationToken,
    count: &mut LoadCount,
) -> Result<(), EtlError> {
    let skip = |count: &mut LoadCount, err: RowError| {
        if count.sampling(options.max_error_samples) {
            warn!(rel_type = %spec.rel_type, %err, "skipping row");
        }
        count.skip(err, options.max_error_samples);
    };

    loop {
        if cancel.is_cancelled() {
            return Err(EtlError::Cancelled);
        }
        let Some(batch) = batches
            .next_batch()
            .await
            .map_err(|e| EtlError::source_missing(&spec.table, e))?
        else {
            break;
        };

        let mut rows = Vec::with_capacity(batch.len());
        let mut lines = Vec::with_capacity(batch.len());
        for record in batch {
            let mapped = match record {
                Record::Row(row) => mapper.map(&row).map(|edge| (row.line, edge)),
                Record::Malformed(err) => Err(err),
            };
            match mapped {
                Ok((line, edge)) => {
                    lines.push(line);
                    rows.push(edge);
                }
                Err(err) => skip(&mut *count, err),
            }
        }

        if rows.is_empty() {
            continue;
        }
        let outcome = session.merge_relationships(pattern, &rows).await?;
        debug!(
            rel_type = %spec.rel_type,
            rows = rows.len(),
            merged = outcome.merged,
            unresolved = outcome.unresolved.len(),
            "merged relationship batch"
        );
        count.loaded += outcome.merged;
        for idx in outcome.unresolved {
            let (Some(line), Some(edge)) = (lines.get(idx), rows.get(idx)) else {
                continue;
            };
            skip(
                &mut *count,
                RowError::UnresolvedEndpoint {
                    line: *line,
                    start: format!("{}({})", pattern.start.label, edge.start),
                    end: format!("{}({})", pattern.end.label, edge.end),
                },
            );
        }
    }

    Ok(())
}

/// Endpoint columns, coercions and orientation for one relationship.
struct EdgeMapper {
    from: (usize, String, Coercion),
    to: (usize, String, Coercion),
    direction: Direction,
}

impl EdgeMapper {
    fn new(spec: &RelationshipSpec, from: &NodeSpec, to: &NodeSpec, columns: &ColumnIndex) -> Self {
        Self {
            from: (
                columns.position(&spec.from_key_column),
                spec.from_key_column.clone(),
                from.key_coercion,
            ),
            to: (
                columns.position(&spec.to_key_column),
                spec.to_key_column.clone(),
                to.key_coercion,
            ),
            direction: spec.direction,
        }
    }

    fn map(&self, row: &SourceRow) -> Result<EdgeRow, RowError> {
        let from = key_cell(row, self.from.0, &self.from.1, self.from.2)?;
        let to = key_cell(row, self.to.0, &self.to.1, self.to.2)?;
        Ok(match self.direction {
            Direction::Forward => EdgeRow {
                start: from,
                end: to,
            },
            Direction::Reverse => EdgeRow {
                start: to,
                end: from,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::load_nodes;
    use crate::source::CsvSource;
    use fingraph_core::{Identifier, MemoryGraphStore, NodeKey, SchemaRegistry};

    async fn seed(store: &MemoryGraphStore, registry: &SchemaRegistry, label: &'static str, csv: &str) {
        let spec = registry.node(&Identifier::from_static(label)).unwrap();
        load_nodes(
            store,
            spec,
            Arc::new(CsvSource::from_text(spec.table.clone(), csv)),
            &LoadOptions::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    }

    async fn load(
        store: &MemoryGraphStore,
        registry: &SchemaRegistry,
        rel_type: &str,
        csv: &str,
    ) -> Result<LoadCount, EtlError> {
        let spec = registry
            .relationships()
            .iter()
            .find(|r| r.rel_type.as_str() == rel_type)
            .unwrap();
        load_relationships(
            store,
            spec,
            registry.endpoints(spec).unwrap(),
            Arc::new(CsvSource::from_text(spec.table.clone(), csv)),
            &LoadOptions {
                batch_size: 2,
                ..Default::default()
            },
            &CancellationToken::new(),
        )
        .await
    }

    #[tokio::test]
    async fn unresolved_endpoints_are_skipped_while_the_rest_load() {
        let store = MemoryGraphStore::new();
        let registry = SchemaRegistry::finance();
        seed(&store, &registry, "Branch", "branch_id,branch_name,location\n1,Main,NC\n").await;
        seed(
            &store,
            &registry,
            "Employee",
            "employee_id,employee_name,position,year_of_joining,salary\n10,A,T,2019,1\n11,B,T,2020,1\n",
        )
        .await;

        let count = load(
            &store,
            &registry,
            "EMPLOYS",
            "employee_id,branch_id\n10,1\n11,1\n12,1\n11,9\n",
        )
        .await
        .unwrap();

        assert_eq!(count.loaded, 2);
        assert_eq!(count.skipped_of("unresolved endpoint"), 2);
        assert_eq!(store.edge_count("EMPLOYS"), 2);
        assert_eq!(store.node_count("Employee"), 2);
        assert_eq!(store.node_count("Branch"), 1);
        assert!(matches!(
            &count.samples[0],
            RowError::UnresolvedEndpoint { line: 4, end, .. } if end == "Employee(12)"
        ));
    }

    #[tokio::test]
    async fn reverse_relationships_point_from_the_declared_target() {
        let store = MemoryGraphStore::new();
        let registry = SchemaRegistry::finance();
        seed(
            &store,
            &registry,
            "Customer",
            "customer_id,name,phone,email,date_joined\n5,C,1,c@x,2020-01-01\n",
        )
        .await;
        seed(
            &store,
            &registry,
            "Account",
            "account_id,balance,date_opened\n100,1.0,2020-01-01\n",
        )
        .await;

        load(&store, &registry, "LINKED_WITH", "account_id,customer_id\n100,5\n100,5\n")
            .await
            .unwrap();

        let linked = registry
            .relationships()
            .iter()
            .find(|r| r.rel_type.as_str() == "LINKED_WITH")
            .unwrap();
        let (from, to) = registry.endpoints(linked).unwrap();
        let pattern = EdgePattern::resolve(linked, from, to);

        assert_eq!(store.edge_count("LINKED_WITH"), 1);
        assert!(store.has_edge(&pattern, &NodeKey::Integer(5), &NodeKey::Integer(100)));
    }

    #[tokio::test]
    async fn bad_endpoint_keys_are_coercion_skips() {
        let store = MemoryGraphStore::new();
        let registry = SchemaRegistry::finance();
        let count = load(&store, &registry, "EMPLOYS", "employee_id,branch_id\nabc,1\n,1\n")
            .await
            .unwrap();
        assert_eq!(count.skipped_of("coercion"), 1);
        assert_eq!(count.skipped_of("missing key"), 1);
        assert_eq!(count.loaded, 0);
    }

    #[tokio::test]
    async fn missing_endpoint_column_is_fatal() {
        let store = MemoryGraphStore::new();
        let registry = SchemaRegistry::finance();
        let err = load(&store, &registry, "EMPLOYS", "employee_id\n10\n")
            .await
            .unwrap_err();
        assert!(matches!(err, EtlError::SourceMissing { .. }));
    }
}
