//! Table sinks: full-table replacement of normalized record batches.

pub mod arrow_store;
pub mod sqlite_store;

pub use arrow_store::ArrowTableSink;
pub use sqlite_store::SqliteTableSink;

use crate::config::{Config, StorageBackend};
use crate::errors::{DataHubError, Result};
use crate::models::{NormalizedRecord, TableSnapshot};
use crate::util::is_valid_table_name;
use std::sync::Arc;

/// Destination for normalized tables.
///
/// `replace_table` swaps a table's entire contents in one step: readers see
/// either the old rows or the new ones. An empty batch leaves the table alone.
pub trait TableSink: Send + Sync {
    /// Replace `table` with `records`, returning how many rows were written.
    fn replace_table(&self, table: &str, records: &[NormalizedRecord]) -> Result<usize>;

    /// Current contents of `table`, or `None` if it was never written.
    fn read_table(&self, table: &str) -> Result<Option<TableSnapshot>>;

    /// Names of every table written so far, sorted.
    fn list_tables(&self) -> Result<Vec<String>>;
}

/// Open the sink selected by the config.
pub fn open_sink(config: &Config) -> Result<Arc<dyn TableSink>> {
    let sink: Arc<dyn TableSink> = match config.storage {
        StorageBackend::Arrow => Arc::new(ArrowTableSink::new(&config.data_dir)),
        StorageBackend::Sqlite => Arc::new(SqliteTableSink::open(&config.database_path)?),
    };
    Ok(sink)
}

/// Reject a batch before anything is written.
pub(crate) fn check_batch(table: &str, records: &[NormalizedRecord]) -> Result<()> {
    check_table_name(table)?;

    if let Some(first) = records.first() {
        if let Some(pos) = records.iter().position(|r| !r.same_shape(first)) {
            return Err(DataHubError::PersistenceError(format!(
                "record {} for table {} has a different field set than record 0",
                pos, table
            )));
        }
        if first.is_empty() {
            return Err(DataHubError::PersistenceError(format!("records for table {} have no fields", table)));
        }
    }
    Ok(())
}

pub(crate) fn check_table_name(table: &str) -> Result<()> {
    if is_valid_table_name(table) {
        Ok(())
    } else {
        Err(DataHubError::PersistenceError(format!("invalid table name: {:?}", table)))
    }
}

/// Wrap storage-level failures so callers see one error kind per sink operation.
pub(crate) fn persistence_error(table: &str, e: DataHubError) -> DataHubError {
    match e {
        DataHubError::PersistenceError(_) => e,
        other => DataHubError::PersistenceError(format!("table {}: {}", table, other)),
    }
}
