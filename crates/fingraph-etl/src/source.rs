//! Tabular sources
//!
//! A [`TabularSource`] is a header-described table that can be opened any
//! number of times, each open yielding the same rows from the start. Reading
//! is blocking I/O; [`RowBatches`] moves it onto the blocking pool and hands
//! rows to async loaders in bounded batches over a bounded channel, so a slow
//! store applies back-pressure to the reader.

use csv::{ReaderBuilder, StringRecord, Trim};
use flate2::read::GzDecoder;
use fingraph_config::SourcesConfig;
use fingraph_core::SchemaRegistry;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Cursor, Read};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace};

use crate::error::{RowError, SourceError};

/// Batches buffered between the reader thread and the loader.
const CHANNEL_DEPTH: usize = 2;

/// One data row: its line in the source and its trimmed cells.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRow {
    pub line: u64,
    cells: Vec<String>,
}

impl SourceRow {
    pub fn new(line: u64, cells: Vec<String>) -> Self {
        Self { line, cells }
    }

    /// Cell at `index`; a short (ragged) row reads as empty.
    pub fn cell(&self, index: usize) -> &str {
        self.cells.get(index).map(String::as_str).unwrap_or("")
    }
}

/// What a source yields per record.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Row(SourceRow),
    /// A record the reader could not decode; the rest of the table is fine.
    Malformed(RowError),
}

/// Records of an opened source. A fatal read error ends the sequence.
pub type Records = Box<dyn Iterator<Item = Result<Record, SourceError>> + Send>;

/// An opened source: its header and a lazy record sequence.
pub struct OpenedSource {
    pub columns: Vec<String>,
    pub records: Records,
}

/// A restartable, header-described table.
pub trait TabularSource: Send + Sync {
    /// Table name, as referenced by node and relationship specifications.
    fn name(&self) -> &str;

    /// Open from the first row. Blocking.
    fn open(&self) -> Result<OpenedSource, SourceError>;
}

enum Origin {
    Path(PathBuf),
    Text(Arc<[u8]>),
}

/// Comma-separated table with a header row, read from a file (gzip when the
/// name ends in `.gz`) or from memory.
pub struct CsvSource {
    table: String,
    origin: Origin,
}

impl CsvSource {
    pub fn from_path(table: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            table: table.into(),
            origin: Origin::Path(path.into()),
        }
    }

    pub fn from_text(table: impl Into<String>, text: &str) -> Self {
        Self {
            table: table.into(),
            origin: Origin::Text(Arc::from(text.as_bytes())),
        }
    }

    fn reader(&self) -> Result<Box<dyn Read + Send>, SourceError> {
        match &self.origin {
            Origin::Text(bytes) => Ok(Box::new(Cursor::new(Arc::clone(bytes)))),
            Origin::Path(path) => {
                let file = File::open(path).map_err(|source| SourceError::Unreadable {
                    path: path.clone(),
                    source,
                })?;
                let gzipped = path.extension().is_some_and(|ext| ext == "gz");
                if gzipped {
                    Ok(Box::new(GzDecoder::new(BufReader::new(file))))
                } else {
                    Ok(Box::new(BufReader::new(file)))
                }
            }
        }
    }
}

impl std::fmt::Debug for CsvSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let origin = match &self.origin {
            Origin::Path(path) => path.display().to_string(),
            Origin::Text(bytes) => format!("<{} bytes in memory>", bytes.len()),
        };
        f.debug_struct("CsvSource")
            .field("table", &self.table)
            .field("origin", &origin)
            .finish()
    }
}

impl TabularSource for CsvSource {
    fn name(&self) -> &str {
        &self.table
    }

    fn open(&self) -> Result<OpenedSource, SourceError> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(Trim::All)
            .from_reader(self.reader()?);

        let columns = reader
            .headers()
            .map_err(|e| header_error(&self.table, e))?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').to_string())
            .collect();

        let table = self.table.clone();
        let records = reader
            .into_records()
            .map(move |result| classify_record(&table, result));

        Ok(OpenedSource {
            columns,
            records: Box::new(records),
        })
    }
}

fn header_error(table: &str, err: csv::Error) -> SourceError {
    SourceError::Header {
        table: table.to_string(),
        message: err.to_string(),
    }
}

fn classify_record(
    table: &str,
    result: Result<StringRecord, csv::Error>,
) -> Result<Record, SourceError> {
    match result {
        Ok(record) => {
            let line = record.position().map(|p| p.line()).unwrap_or_default();
            Ok(Record::Row(SourceRow::new(
                line,
                record.iter().map(str::to_string).collect(),
            )))
        }
        Err(err) => {
            let line = err.position().map(|p| p.line()).unwrap_or_default();
            let message = err.to_string();
            match err.into_kind() {
                csv::ErrorKind::Io(source) => Err(SourceError::Read {
                    table: table.to_string(),
                    line,
                    source,
                }),
                _ => Ok(Record::Malformed(RowError::Malformed { line, message })),
            }
        }
    }
}

/// Positions of required columns in a source header.
#[derive(Debug, Clone)]
pub struct ColumnIndex {
    positions: BTreeMap<String, usize>,
}

impl ColumnIndex {
    /// Locate every required column; any absent one fails the whole load.
    pub fn resolve(
        table: &str,
        header: &[String],
        required: &[&str],
    ) -> Result<Self, SourceError> {
        let mut positions = BTreeMap::new();
        let mut missing = Vec::new();
        for column in required {
            match header.iter().position(|h| h.trim() == column.trim()) {
                Some(idx) => {
                    positions.insert(column.to_string(), idx);
                }
                None => missing.push(column.to_string()),
            }
        }
        if missing.is_empty() {
            Ok(Self { positions })
        } else {
            missing.dedup();
            Err(SourceError::MissingColumns {
                table: table.to_string(),
                columns: missing,
            })
        }
    }

    /// Position of a column that was passed to [`ColumnIndex::resolve`].
    pub fn position(&self, column: &str) -> usize {
        self.positions.get(column).copied().unwrap_or(usize::MAX)
    }
}

/// Async, batched view of a source read on the blocking pool.
///
/// Dropping it stops the reader at its next batch boundary.
pub struct RowBatches {
    table: String,
    columns: Vec<String>,
    rx: mpsc::Receiver<Result<Vec<Record>, SourceError>>,
}

impl RowBatches {
    pub async fn open(
        source: Arc<dyn TabularSource>,
        batch_size: usize,
    ) -> Result<Self, SourceError> {
        let table = source.name().to_string();
        let batch_size = batch_size.max(1);
        let (header_tx, header_rx) = oneshot::channel();
        let (tx, rx) = mpsc::channel(CHANNEL_DEPTH);

        tokio::task::spawn_blocking(move || {
            let opened = match source.open() {
                Ok(opened) => opened,
                Err(err) => {
                    let _ = header_tx.send(Err(err));
                    return;
                }
            };
            if header_tx.send(Ok(opened.columns)).is_err() {
                return;
            }

            let mut batch = Vec::with_capacity(batch_size);
            for item in opened.records {
                match item {
                    Ok(record) => {
                        batch.push(record);
                        if batch.len() == batch_size {
                            let full = std::mem::replace(&mut batch, Vec::with_capacity(batch_size));
                            if tx.blocking_send(Ok(full)).is_err() {
                                trace!(table = source.name(), "reader stopped by consumer");
                                return;
                            }
                        }
                    }
                    Err(err) => {
                        let _ = tx.blocking_send(Err(err));
                        return;
                    }
                }
            }
            if !batch.is_empty() {
                let _ = tx.blocking_send(Ok(batch));
            }
        });

        let columns = header_rx
            .await
            .map_err(|_| SourceError::Interrupted {
                table: table.clone(),
            })??;
        debug!(%table, columns = columns.len(), "opened source");

        Ok(Self { table, columns, rx })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Next batch, or `None` once the source is exhausted.
    pub async fn next_batch(&mut self) -> Result<Option<Vec<Record>>, SourceError> {
        self.rx.recv().await.transpose()
    }
}

/// Table name to source.
#[derive(Default, Clone)]
pub struct SourceCatalog {
    sources: BTreeMap<String, Arc<dyn TabularSource>>,
}

impl SourceCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// CSV files for every table `registry` reads, located through `config`.
    /// Tables without a configured path stay undeclared.
    pub fn from_config(config: &SourcesConfig, registry: &SchemaRegistry) -> Self {
        let tables = registry
            .nodes()
            .iter()
            .map(|n| n.table.as_str())
            .chain(registry.relationships().iter().map(|r| r.table.as_str()));

        let mut catalog = Self::new();
        for table in tables {
            if catalog.sources.contains_key(table) {
                continue;
            }
            if let Some(path) = config.resolve(table) {
                debug!(table, path = %path.display(), "registered csv source");
                catalog.insert(CsvSource::from_path(table, path));
            }
        }
        catalog
    }

    pub fn insert(&mut self, source: impl TabularSource + 'static) {
        self.sources
            .insert(source.name().to_string(), Arc::new(source));
    }

    pub fn with(mut self, source: impl TabularSource + 'static) -> Self {
        self.insert(source);
        self
    }

    pub fn get(&self, table: &str) -> Result<Arc<dyn TabularSource>, SourceError> {
        self.sources
            .get(table)
            .cloned()
            .ok_or_else(|| SourceError::Undeclared {
                table: table.to_string(),
            })
    }

    pub fn tables(&self) -> impl Iterator<Item = &str> {
        self.sources.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for SourceCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.sources.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn rows(source: &dyn TabularSource) -> Vec<Record> {
        source
            .open()
            .unwrap()
            .records
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
    }

    #[test]
    fn reads_header_and_trimmed_cells() {
        let source = CsvSource::from_text(
            "branches",
            "branch_id, branch_name ,location\n1, Main ,NC\n2,East,SC\n",
        );
        let opened = source.open().unwrap();
        assert_eq!(opened.columns, vec!["branch_id", "branch_name", "location"]);

        let records = rows(&source);
        assert_eq!(records.len(), 2);
        match &records[0] {
            Record::Row(row) => {
                assert_eq!(row.line, 2);
                assert_eq!(row.cell(1), "Main");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn reopening_yields_the_same_rows() {
        let source = CsvSource::from_text("branches", "branch_id\n1\n2\n3\n");
        assert_eq!(rows(&source), rows(&source));
    }

    #[test]
    fn ragged_rows_read_missing_cells_as_empty() {
        let source = CsvSource::from_text("branches", "branch_id,branch_name,location\n1,Main\n");
        match &rows(&source)[0] {
            Record::Row(row) => assert_eq!(row.cell(2), ""),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn invalid_utf8_is_a_row_level_fault() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"branch_id,branch_name\n1,Main\n2,\xff\xfe\n3,East\n")
            .unwrap();
        let source = CsvSource::from_path("branches", file.path());

        let records = rows(&source);
        assert_eq!(records.len(), 3);
        assert!(matches!(
            records[1],
            Record::Malformed(RowError::Malformed { .. })
        ));
        assert!(matches!(records[2], Record::Row(_)));
    }

    #[test]
    fn gzip_files_are_decompressed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("branches.csv.gz");
        let mut encoder = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        encoder.write_all(b"branch_id,branch_name\n1,Main\n").unwrap();
        encoder.finish().unwrap();

        let source = CsvSource::from_path("branches", &path);
        assert_eq!(source.open().unwrap().columns, vec!["branch_id", "branch_name"]);
        assert_eq!(rows(&source).len(), 1);
    }

    #[test]
    fn missing_file_is_unreadable() {
        let source = CsvSource::from_path("branches", "/definitely/not/here.csv");
        assert!(matches!(source.open(), Err(SourceError::Unreadable { .. })));
    }

    #[test]
    fn column_index_reports_every_missing_column() {
        let header = vec!["branch_id".to_string(), "location".to_string()];
        let index = ColumnIndex::resolve("branches", &header, &["branch_id", "location"]).unwrap();
        assert_eq!(index.position("location"), 1);

        let err = ColumnIndex::resolve("branches", &header, &["branch_id", "branch_name", "city"])
            .unwrap_err();
        match err {
            SourceError::MissingColumns { table, columns } => {
                assert_eq!(table, "branches");
                assert_eq!(columns, vec!["branch_name", "city"]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn batches_respect_the_batch_size() {
        let source = CsvSource::from_text("branches", "branch_id\n1\n2\n3\n4\n5\n");
        let mut batches = RowBatches::open(Arc::new(source), 2).await.unwrap();
        assert_eq!(batches.columns(), ["branch_id"]);

        let mut sizes = Vec::new();
        while let Some(batch) = batches.next_batch().await.unwrap() {
            sizes.push(batch.len());
        }
        assert_eq!(sizes, vec![2, 2, 1]);
    }

    #[tokio::test]
    async fn open_failures_surface_before_any_batch() {
        let source = CsvSource::from_path("branches", "/definitely/not/here.csv");
        let err = RowBatches::open(Arc::new(source), 10).await.err().unwrap();
        assert!(matches!(err, SourceError::Unreadable { .. }));
    }

    #[test]
    fn catalog_uses_configured_paths_and_reports_undeclared_tables() {
        let mut config = SourcesConfig::default();
        config.tables.remove("reviews");
        let catalog = SourceCatalog::from_config(&config, &SchemaRegistry::finance());

        assert!(catalog.get("branches").is_ok());
        assert!(matches!(
            catalog.get("reviews"),
            Err(SourceError::Undeclared { table }) if table == "reviews"
        ));
        assert_eq!(catalog.tables().count(), 5);
    }
}
