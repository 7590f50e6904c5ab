//! Tabular source locations

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Tables of the built-in finance schema and the environment variable that
/// can point each one at a file.
pub const TABLE_ENV_VARS: [(&str, &str); 6] = [
    ("branches", "BRANCHES_CSV_PATH"),
    ("employees", "EMPLOYEES_CSV_PATH"),
    ("customers", "CUSTOMERS_CSV_PATH"),
    ("accounts", "ACCOUNTS_CSV_PATH"),
    ("transactions", "TRANSACTIONS_CSV_PATH"),
    ("reviews", "REVIEWS_CSV_PATH"),
];

/// Where each table's delimited file lives.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SourcesConfig {
    /// Relative table paths resolve against this directory.
    pub base_dir: Option<PathBuf>,
    /// Table name to file path.
    pub tables: BTreeMap<String, PathBuf>,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            base_dir: Some(PathBuf::from("data")),
            tables: TABLE_ENV_VARS
                .iter()
                .map(|(table, _)| (table.to_string(), PathBuf::from(format!("{table}.csv"))))
                .collect(),
        }
    }
}

impl SourcesConfig {
    /// Resolved location of `table`, if configured.
    ///
    /// A `file://` prefix is accepted and stripped; relative paths are joined
    /// onto `base_dir`.
    pub fn resolve(&self, table: &str) -> Option<PathBuf> {
        let configured = self.tables.get(table)?;
        let path = strip_file_scheme(configured);
        match &self.base_dir {
            Some(base) if path.is_relative() => Some(base.join(path)),
            _ => Some(path),
        }
    }
}

fn strip_file_scheme(path: &Path) -> PathBuf {
    match path.to_str().and_then(|s| s.strip_prefix("file://")) {
        Some(rest) => PathBuf::from(rest),
        None => path.to_path_buf(),
    }
}
