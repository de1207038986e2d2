use super::{check_batch, check_table_name, persistence_error, TableSink};
use crate::errors::{DataHubError, Result};
use crate::models::{FieldValue, NormalizedRecord, TableSnapshot};
use chrono::{DateTime, Utc};
use log::{debug, info};
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::path::{Path, PathBuf};

/// Bookkeeping table: one row per data table with its last replacement time.
const SNAPSHOTS_TABLE: &str = "table_snapshots";

/// All tables in one SQLite database.
pub struct SqliteTableSink {
    db_path: PathBuf,
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn open_db(db_path: &Path) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA busy_timeout = 30000;
    "#,
    )?;
    Ok(conn)
}

impl SqliteTableSink {
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let sink = Self {
            db_path: db_path.to_path_buf(),
        };
        sink.init_schema()?;
        Ok(sink)
    }

    fn connect(&self) -> Result<Connection> {
        Ok(open_db(&self.db_path)?)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.connect()?;
        conn.execute_batch(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                table_name TEXT PRIMARY KEY,
                captured_at TEXT NOT NULL,
                row_count INTEGER NOT NULL
            );
            "#,
            SNAPSHOTS_TABLE
        ))?;
        Ok(())
    }

    fn write(&self, table: &str, records: &[NormalizedRecord]) -> Result<()> {
        let columns: Vec<&str> = records.first().map(|r| r.field_names().collect()).unwrap_or_default();
        let column_defs: Vec<String> = columns
            .iter()
            .map(|c| {
                let numeric = records
                    .iter()
                    .all(|r| !matches!(r.get(c), Some(FieldValue::Text(_))));
                format!("{} {}", quote_ident(c), if numeric { "REAL" } else { "TEXT" })
            })
            .collect();
        let placeholders = vec!["?"; columns.len()].join(", ");
        let quoted_table = quote_ident(table);

        let mut conn = self.connect()?;
        let tx = conn.transaction()?;

        tx.execute(&format!("DROP TABLE IF EXISTS {}", quoted_table), [])?;
        tx.execute(&format!("CREATE TABLE {} ({})", quoted_table, column_defs.join(", ")), [])?;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO {} ({}) VALUES ({})",
                quoted_table,
                columns.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", "),
                placeholders
            ))?;
            for record in records {
                let values = record.iter().map(|(_, value)| match value {
                    FieldValue::Text(s) => SqlValue::Text(s.clone()),
                    FieldValue::Number(n) => SqlValue::Real(*n),
                    FieldValue::Null => SqlValue::Null,
                });
                stmt.execute(params_from_iter(values))?;
            }
        }
        tx.execute(
            &format!(
                "INSERT OR REPLACE INTO {} (table_name, captured_at, row_count) VALUES (?1, ?2, ?3)",
                SNAPSHOTS_TABLE
            ),
            params![table, Utc::now().to_rfc3339(), records.len() as i64],
        )?;

        tx.commit()?;
        Ok(())
    }
}

impl TableSink for SqliteTableSink {
    fn replace_table(&self, table: &str, records: &[NormalizedRecord]) -> Result<usize> {
        check_batch(table, records)?;
        if table == SNAPSHOTS_TABLE {
            return Err(DataHubError::PersistenceError(format!("{} is reserved", table)));
        }
        if records.is_empty() {
            debug!("No records for {}, leaving table untouched", table);
            return Ok(0);
        }

        self.write(table, records).map_err(|e| persistence_error(table, e))?;
        info!("Replaced table {} with {} records", table, records.len());
        Ok(records.len())
    }

    fn read_table(&self, table: &str) -> Result<Option<TableSnapshot>> {
        check_table_name(table)?;
        let conn = self.connect()?;

        let captured_at: Option<String> = conn
            .query_row(
                &format!("SELECT captured_at FROM {} WHERE table_name = ?1", SNAPSHOTS_TABLE),
                params![table],
                |row| row.get(0),
            )
            .optional()?;
        let Some(captured_at) = captured_at else {
            return Ok(None);
        };
        let captured_at = DateTime::parse_from_rfc3339(&captured_at)?.with_timezone(&Utc);

        let mut stmt = conn.prepare(&format!("SELECT * FROM {} ORDER BY rowid", quote_ident(table)))?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(str::to_string).collect();

        let mut rows = stmt.query([])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            let mut record = NormalizedRecord::new();
            for (i, column) in columns.iter().enumerate() {
                let value = match row.get_ref(i)? {
                    ValueRef::Null => FieldValue::Null,
                    ValueRef::Integer(n) => FieldValue::Number(n as f64),
                    ValueRef::Real(n) => FieldValue::Number(n),
                    ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
                        FieldValue::Text(String::from_utf8_lossy(bytes).into_owned())
                    }
                };
                record.insert(column.as_str(), value);
            }
            records.push(record);
        }

        TableSnapshot::new(table, records, captured_at).map(Some)
    }

    fn list_tables(&self) -> Result<Vec<String>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!("SELECT table_name FROM {} ORDER BY table_name", SNAPSHOTS_TABLE))?;
        let tables = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tables)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn indices(names: &[&str]) -> Vec<NormalizedRecord> {
        names
            .iter()
            .map(|n| {
                NormalizedRecord::new()
                    .with("index", *n)
                    .with("last", 22000.5)
                    .with("pe", Option::<f64>::None)
            })
            .collect()
    }

    #[test]
    fn replace_round_trips_through_sqlite() {
        let dir = tempfile::tempdir().unwrap();
        let sink = SqliteTableSink::open(&dir.path().join("nse.db")).unwrap();

        sink.replace_table("all_indices", &indices(&["NIFTY 50", "NIFTY BANK"])).unwrap();
        sink.replace_table("all_indices", &indices(&["NIFTY IT"])).unwrap();

        let snapshot = sink.read_table("all_indices").unwrap().unwrap();
        assert_eq!(snapshot.records, indices(&["NIFTY IT"]));
        assert_eq!(sink.list_tables().unwrap(), vec!["all_indices"]);
    }

    #[test]
    fn empty_batch_keeps_existing_rows() {
        let dir = tempfile::tempdir().unwrap();
        let sink = SqliteTableSink::open(&dir.path().join("nse.db")).unwrap();
        sink.replace_table("all_indices", &indices(&["NIFTY 50"])).unwrap();

        assert_eq!(sink.replace_table("all_indices", &[]).unwrap(), 0);
        assert_eq!(sink.read_table("all_indices").unwrap().unwrap().len(), 1);
        assert!(sink.read_table("missing").unwrap().is_none());
    }

    #[test]
    fn bookkeeping_table_is_reserved() {
        let dir = tempfile::tempdir().unwrap();
        let sink = SqliteTableSink::open(&dir.path().join("nse.db")).unwrap();
        let err = sink.replace_table(SNAPSHOTS_TABLE, &indices(&["X"])).unwrap_err();
        assert!(matches!(err, DataHubError::PersistenceError(_)));
    }
}
