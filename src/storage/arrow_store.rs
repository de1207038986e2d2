use super::{check_batch, check_table_name, persistence_error, TableSink};
use crate::errors::Result;
use crate::models::{NormalizedRecord, TableSnapshot};
use crate::util::arrow_utils;
use chrono::Utc;
use log::{debug, info};
use std::path::PathBuf;

const EXTENSION: &str = "arrow";

/// One Arrow IPC file per table under a data directory.
pub struct ArrowTableSink {
    dir: PathBuf,
}

impl ArrowTableSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn table_path(&self, table: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", table, EXTENSION))
    }

    fn write(&self, table: &str, records: &[NormalizedRecord]) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let batch = arrow_utils::records_to_record_batch(table, records, Utc::now())?;
        arrow_utils::save_batch_atomically(&batch, &self.table_path(table))
    }
}

impl TableSink for ArrowTableSink {
    fn replace_table(&self, table: &str, records: &[NormalizedRecord]) -> Result<usize> {
        check_batch(table, records)?;
        if records.is_empty() {
            debug!("No records for {}, leaving table untouched", table);
            return Ok(0);
        }

        self.write(table, records).map_err(|e| persistence_error(table, e))?;
        info!("Replaced {} with {} records", self.table_path(table).display(), records.len());
        Ok(records.len())
    }

    fn read_table(&self, table: &str) -> Result<Option<TableSnapshot>> {
        check_table_name(table)?;
        let path = self.table_path(table);
        if !path.exists() {
            return Ok(None);
        }
        arrow_utils::read_snapshot_from_arrow(&path).map(Some)
    }

    fn list_tables(&self) -> Result<Vec<String>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut tables = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                tables.push(stem.to_string());
            }
        }
        tables.sort();
        Ok(tables)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::DataHubError;

    fn gainers(symbols: &[&str]) -> Vec<NormalizedRecord> {
        symbols
            .iter()
            .enumerate()
            .map(|(i, s)| NormalizedRecord::new().with("symbol", *s).with("ltp", 100.0 + i as f64))
            .collect()
    }

    #[test]
    fn second_replace_leaves_only_second_batch() {
        let dir = tempfile::tempdir().unwrap();
        let sink = ArrowTableSink::new(dir.path());

        assert_eq!(sink.replace_table("top_gainers", &gainers(&["A", "B", "C"])).unwrap(), 3);
        assert_eq!(sink.replace_table("top_gainers", &gainers(&["D"])).unwrap(), 1);

        let snapshot = sink.read_table("top_gainers").unwrap().unwrap();
        assert_eq!(snapshot.records, gainers(&["D"]));
        assert_eq!(sink.list_tables().unwrap(), vec!["top_gainers"]);
    }

    #[test]
    fn empty_replace_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let sink = ArrowTableSink::new(dir.path());
        sink.replace_table("t", &gainers(&["A"])).unwrap();

        assert_eq!(sink.replace_table("t", &[]).unwrap(), 0);
        assert_eq!(sink.read_table("t").unwrap().unwrap().len(), 1);
        assert!(sink.read_table("never_written").unwrap().is_none());
    }

    #[test]
    fn rejects_bad_names_and_mixed_shapes() {
        let dir = tempfile::tempdir().unwrap();
        let sink = ArrowTableSink::new(dir.path());

        let err = sink.replace_table("../escape", &gainers(&["A"])).unwrap_err();
        assert!(matches!(err, DataHubError::PersistenceError(_)));

        let mut mixed = gainers(&["A"]);
        mixed.push(NormalizedRecord::new().with("symbol", "B"));
        let err = sink.replace_table("t", &mixed).unwrap_err();
        assert!(matches!(err, DataHubError::PersistenceError(_)));
        assert!(sink.list_tables().unwrap().is_empty());
    }
}
