//! Node Loader

use fingraph_core::{
    Coercion, CoercionError, GraphSession, GraphStore, Identifier, NodeKey, NodeRef, NodeRow,
    NodeSpec,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{EtlError, RowError};
use crate::options::LoadOptions;
use crate::report::LoadCount;
use crate::source::{ColumnIndex, Record, RowBatches, SourceRow, TabularSource};

/// Upsert one node per row of `source` under `spec`.
///
/// Rows with an empty or uncoercible key, or an uncoercible mapped value, are
/// skipped and counted. An empty mapped cell leaves that property untouched.
/// Cancellation is observed between batches.
pub async fn load_nodes(
    store: &dyn GraphStore,
    spec: &NodeSpec,
    source: Arc<dyn TabularSource>,
    options: &LoadOptions,
    cancel: &CancellationToken,
) -> Result<LoadCount, EtlError> {
    let mut count = LoadCount::default();
    load_nodes_into(store, spec, source, options, cancel, &mut count).await?;
    Ok(count)
}

/// [`load_nodes`], accumulating into `count` so rows already written are
/// still counted when the load fails part way.
pub(crate) async fn load_nodes_into(
    store: &dyn GraphStore,
    spec: &NodeSpec,
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
    let mapper = NodeMapper::new(spec, &columns);

    let mut session = store.session().await?;
    let outcome = drive(
        session.as_mut(),
        spec,
        &mapper,
        &mut batches,
        options,
        cancel,
        count,
    )
    .await;
    if let Err(err) = session.close().await {
        warn!(label = %spec.label, error = %err, "failed to close session");
    }

    if let Err(err) = outcome {
        warn!(
            label = %spec.label,
            loaded = count.loaded,
            skipped = count.skipped,
            error = %err,
            "node load stopped"
        );
        return Err(err);
    }
    info!(
        label = %spec.label,
        loaded = count.loaded,
        skipped = count.skipped,
        "loaded nodes"
    );
    Ok(())
}

async fn drive(
    session: &mut dyn GraphSession,
    spec: &NodeSpec,
    mapper: &NodeMapper,
    batches: &mut RowBatches,
    options: &LoadOptions,
    cancel: &CancellationToken,
    count: &mut LoadCount,
) -> Result<(), EtlError> {
    let target = NodeRef::from(spec);

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
        for record in batch {
            let mapped = match record {
                Record::Row(row) => mapper.map(&row),
                Record::Malformed(err) => Err(err),
            };
            match mapped {
                Ok(row) => rows.push(row),
                Err(err) => {
                    if count.sampling(options.max_error_samples) {
                        warn!(label = %spec.label, %err, "skipping row");
                    }
                    count.skip(err, options.max_error_samples);
                }
            }
        }

        if !rows.is_empty() {
            let written = session.merge_nodes(&target, &rows).await?;
            debug!(label = %spec.label, rows = rows.len(), written, "merged node batch");
            count.loaded += written;
        }
    }

    Ok(())
}

/// Coerce a key cell. Empty is a missing key; a bad value is a coercion skip.
pub(crate) fn key_cell(
    row: &SourceRow,
    position: usize,
    column: &str,
    coercion: Coercion,
) -> Result<NodeKey, RowError> {
    let coercion_error = |source| RowError::Coercion {
        line: row.line,
        column: column.to_string(),
        source,
    };
    let raw = row.cell(position);
    let value = coercion
        .apply(raw)
        .map_err(coercion_error)?
        .ok_or_else(|| RowError::MissingKey {
            line: row.line,
            column: column.to_string(),
        })?;
    NodeKey::from_value(value).ok_or_else(|| {
        coercion_error(CoercionError {
            coercion,
            value: raw.trim().to_string(),
        })
    })
}

/// Column positions and coercions for one node specification.
struct NodeMapper {
    key: (usize, String, Coercion),
    properties: Vec<(usize, String, Identifier, Coercion)>,
}

impl NodeMapper {
    fn new(spec: &NodeSpec, columns: &ColumnIndex) -> Self {
        Self {
            key: (
                columns.position(&spec.key_column),
                spec.key_column.clone(),
                spec.key_coercion,
            ),
            properties: spec
                .properties
                .iter()
                .map(|m| {
                    (
                        columns.position(&m.column),
                        m.column.clone(),
                        m.property.clone(),
                        m.coercion,
                    )
                })
                .collect(),
        }
    }

    fn map(&self, row: &SourceRow) -> Result<NodeRow, RowError> {
        let (key_position, key_column, key_coercion) = &self.key;
        let key = key_cell(row, *key_position, key_column, *key_coercion)?;

        let mut properties = BTreeMap::new();
        for (position, column, property, coercion) in &self.properties {
            let value = coercion
                .apply(row.cell(*position))
                .map_err(|source| RowError::Coercion {
                    line: row.line,
                    column: column.clone(),
                    source,
                })?;
            if let Some(value) = value {
                properties.insert(property.clone(), value);
            }
        }

        Ok(NodeRow { key, properties })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourceError;
    use crate::source::{CsvSource, OpenedSource};
    use fingraph_core::{MemoryGraphStore, PropertyValue, SchemaRegistry};

    fn finance_node(label: &'static str) -> NodeSpec {
        SchemaRegistry::finance()
            .node(&Identifier::from_static(label))
            .cloned()
            .unwrap()
    }

    async fn load(store: &MemoryGraphStore, label: &'static str, csv: &str) -> LoadCount {
        let spec = finance_node(label);
        let source = Arc::new(CsvSource::from_text(spec.table.clone(), csv));
        load_nodes(
            store,
            &spec,
            source,
            &LoadOptions {
                batch_size: 2,
                ..Default::default()
            },
            &CancellationToken::new(),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn coerces_mapped_columns_into_typed_properties() {
        let store = MemoryGraphStore::new();
        let count = load(
            &store,
            "Employee",
            "employee_id,branch_id,employee_name,position,year_of_joining,salary\n\
             10,1,Ada,Teller,2019,52000.50\n",
        )
        .await;
        assert_eq!(count.loaded, 1);

        let props = store
            .node(&NodeRef::from(&finance_node("Employee")), &NodeKey::Integer(10))
            .unwrap();
        assert_eq!(props["name"], PropertyValue::String("Ada".into()));
        assert_eq!(props["year_of_joining"], PropertyValue::Integer(2019));
        assert_eq!(props["salary"], PropertyValue::Float(52000.5));
        assert!(!props.contains_key("branch_id"));
    }

    #[tokio::test]
    async fn bad_rows_are_skipped_and_counted_by_kind() {
        let store = MemoryGraphStore::new();
        let count = load(
            &store,
            "Account",
            "account_id,customer_id,branch_id,balance,date_opened\n\
             1,5,1,100.0,2020-01-01\n\
             ,5,1,50.0,2020-01-02\n\
             3,5,1,lots,2020-01-03\n\
             x,5,1,10.0,2020-01-04\n\
             5,5,1,20.0,2020-13-01\n\
             6,5,1,30.0,2020-02-01\n",
        )
        .await;

        assert_eq!(count.loaded, 2);
        assert_eq!(count.skipped, 4);
        assert_eq!(count.skipped_of("missing key"), 1);
        assert_eq!(count.skipped_of("coercion"), 3);
        assert_eq!(store.node_count("Account"), 2);
        assert_eq!(count.samples[0].line(), 3);
    }

    #[tokio::test]
    async fn empty_cells_leave_existing_properties_alone() {
        let store = MemoryGraphStore::new();
        load(&store, "Branch", "branch_id,branch_name,location\n1,Main,NC\n").await;
        load(&store, "Branch", "branch_id,branch_name,location\n1,,SC\n").await;

        let props = store
            .node(&NodeRef::from(&finance_node("Branch")), &NodeKey::Integer(1))
            .unwrap();
        assert_eq!(props["name"], PropertyValue::String("Main".into()));
        assert_eq!(props["location"], PropertyValue::String("SC".into()));
    }

    #[tokio::test]
    async fn missing_required_column_fails_the_load() {
        let store = MemoryGraphStore::new();
        let spec = finance_node("Branch");
        let source = Arc::new(CsvSource::from_text("branches", "branch_id,location\n1,NC\n"));
        let err = load_nodes(
            &store,
            &spec,
            source,
            &LoadOptions::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, EtlError::SourceMissing { ref table, .. } if table == "branches"));
        assert_eq!(store.total_nodes(), 0);
    }

    #[tokio::test]
    async fn cancelled_token_stops_before_the_first_batch() {
        let store = MemoryGraphStore::new();
        let spec = finance_node("Branch");
        let source = Arc::new(CsvSource::from_text(
            "branches",
            "branch_id,branch_name,location\n1,Main,NC\n",
        ));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = load_nodes(&store, &spec, source, &LoadOptions::default(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, EtlError::Cancelled));
        assert_eq!(store.total_nodes(), 0);
    }

    /// Yields one good branch row, then the underlying reader fails.
    struct TruncatedSource;

    impl TabularSource for TruncatedSource {
        fn name(&self) -> &str {
            "branches"
        }

        fn open(&self) -> Result<OpenedSource, SourceError> {
            let records = vec![
                Ok(Record::Row(SourceRow::new(
                    2,
                    vec!["1".into(), "Main".into(), "NC".into()],
                ))),
                Err(SourceError::Read {
                    table: "branches".into(),
                    line: 3,
                    source: std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "disk gone"),
                }),
            ];
            Ok(OpenedSource {
                columns: vec!["branch_id".into(), "branch_name".into(), "location".into()],
                records: Box::new(records.into_iter()),
            })
        }
    }

    #[tokio::test]
    async fn read_failure_mid_stream_fails_the_load_but_keeps_its_count() {
        let store = MemoryGraphStore::new();
        let spec = finance_node("Branch");
        let mut count = LoadCount::default();

        let err = load_nodes_into(
            &store,
            &spec,
            Arc::new(TruncatedSource),
            &LoadOptions {
                batch_size: 1,
                ..Default::default()
            },
            &CancellationToken::new(),
            &mut count,
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            EtlError::SourceMissing {
                ref table,
                source: SourceError::Read { line: 3, .. },
            } if table == "branches"
        ));
        assert_eq!(count.loaded, 1);
        assert_eq!(store.node_count("Branch"), 1);
    }

    #[test]
    fn key_cell_distinguishes_missing_from_malformed() {
        let row = SourceRow::new(4, vec!["  ".into(), "abc".into(), "7".into()]);
        assert!(matches!(
            key_cell(&row, 0, "id", Coercion::Integer),
            Err(RowError::MissingKey { line: 4, .. })
        ));
        assert!(matches!(
            key_cell(&row, 1, "id", Coercion::Integer),
            Err(RowError::Coercion { line: 4, .. })
        ));
        assert_eq!(
            key_cell(&row, 2, "id", Coercion::Integer).unwrap(),
            NodeKey::Integer(7)
        );
    }
}
