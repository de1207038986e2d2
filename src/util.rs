use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use chrono_tz::Asia::Kolkata;
use log::warn;
use serde_json::Value;

const NULL_MARKERS: &[&str] = &["-", "n/a", "na", "null", "none", ""];

// Trading session in IST, minutes since midnight
const MARKET_OPEN_MINUTE: u32 = 9 * 60 + 15;
const MARKET_CLOSE_MINUTE: u32 = 15 * 60 + 30;

/// Parse an exchange numeric field such as `"1,234.50"` or `"-2.3%"`.
pub fn clean_numeric_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let cleaned: String = s.chars().filter(|c| !matches!(c, ',' | '%' | ' ')).collect();
            if NULL_MARKERS.contains(&cleaned.to_lowercase().as_str()) {
                return None;
            }
            match cleaned.parse::<f64>() {
                Ok(n) if n.is_finite() => Some(n),
                _ => {
                    warn!("Could not parse numeric value: {:?}", s);
                    None
                }
            }
        }
        _ => None,
    }
}

/// Trimmed text, with placeholder markers mapped to `None`.
pub fn clean_string_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => {
            let trimmed = s.trim();
            if NULL_MARKERS.contains(&trimmed.to_lowercase().as_str()) {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

pub fn is_valid_table_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Whether the exchange's regular session (09:15 to 15:30 IST, Mon-Fri) is running at `now`.
pub fn is_market_open(now: DateTime<Utc>) -> bool {
    let local = now.with_timezone(&Kolkata);
    if matches!(local.weekday(), Weekday::Sat | Weekday::Sun) {
        return false;
    }
    let minute = local.hour() * 60 + local.minute();
    (MARKET_OPEN_MINUTE..=MARKET_CLOSE_MINUTE).contains(&minute)
}

// Arrow conversion helpers for table snapshots
pub mod arrow_utils {
    use crate::errors::{DataHubError, Result};
    use crate::models::{FieldValue, NormalizedRecord, TableSnapshot};
    use arrow::array::{ArrayRef, Float64Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use arrow::ipc::reader::FileReader;
    use arrow::ipc::writer::FileWriter;
    use arrow::record_batch::RecordBatch;
    use arrow_array::Array;
    use chrono::{DateTime, Utc};
    use std::collections::HashMap;
    use std::fs::File;
    use std::io::{Read, Seek};
    use std::path::Path;
    use std::sync::Arc;

    pub const TABLE_NAME_KEY: &str = "table_name";
    pub const CAPTURED_AT_KEY: &str = "captured_at";

    fn is_numeric_column(records: &[NormalizedRecord], column: &str) -> bool {
        let mut seen_number = false;
        for record in records {
            match record.get(column) {
                Some(FieldValue::Number(_)) => seen_number = true,
                Some(FieldValue::Text(_)) => return false,
                _ => {}
            }
        }
        seen_number
    }

    // Convert a record batch to an Arrow RecordBatch, one column per field
    pub fn records_to_record_batch(
        table_name: &str,
        records: &[NormalizedRecord],
        captured_at: DateTime<Utc>,
    ) -> Result<RecordBatch> {
        let snapshot = TableSnapshot::new(table_name, records.to_vec(), captured_at)?;
        let columns = snapshot.columns();

        let mut fields = Vec::with_capacity(columns.len());
        let mut arrays: Vec<ArrayRef> = Vec::with_capacity(columns.len());

        for column in columns {
            if is_numeric_column(records, column) {
                let values: Vec<Option<f64>> = records
                    .iter()
                    .map(|r| r.get(column).and_then(FieldValue::as_f64))
                    .collect();
                fields.push(Field::new(column, DataType::Float64, true));
                arrays.push(Arc::new(Float64Array::from(values)));
            } else {
                let values: Vec<Option<String>> = records
                    .iter()
                    .map(|r| match r.get(column) {
                        Some(FieldValue::Text(s)) => Some(s.clone()),
                        Some(FieldValue::Number(n)) => Some(n.to_string()),
                        _ => None,
                    })
                    .collect();
                fields.push(Field::new(column, DataType::Utf8, true));
                arrays.push(Arc::new(StringArray::from(values)));
            }
        }

        let mut metadata = HashMap::new();
        metadata.insert(TABLE_NAME_KEY.to_string(), table_name.to_string());
        metadata.insert(CAPTURED_AT_KEY.to_string(), captured_at.to_rfc3339());
        let schema = Schema::new_with_metadata(fields, metadata);

        Ok(RecordBatch::try_new(Arc::new(schema), arrays)?)
    }

    // Rebuild normalized records from a batch written by records_to_record_batch
    pub fn record_batch_to_records(batch: &RecordBatch) -> Result<Vec<NormalizedRecord>> {
        let schema = batch.schema();
        let mut records = vec![NormalizedRecord::new(); batch.num_rows()];

        for (field, column) in schema.fields().iter().zip(batch.columns()) {
            let name = field.name();
            match field.data_type() {
                DataType::Float64 => {
                    let array = column
                        .as_any()
                        .downcast_ref::<Float64Array>()
                        .ok_or_else(|| DataHubError::DataError(format!("Failed to downcast column {}", name)))?;
                    for (i, record) in records.iter_mut().enumerate() {
                        let value = if array.is_null(i) {
                            FieldValue::Null
                        } else {
                            FieldValue::Number(array.value(i))
                        };
                        record.insert(name.as_str(), value);
                    }
                }
                DataType::Utf8 => {
                    let array = column
                        .as_any()
                        .downcast_ref::<StringArray>()
                        .ok_or_else(|| DataHubError::DataError(format!("Failed to downcast column {}", name)))?;
                    for (i, record) in records.iter_mut().enumerate() {
                        let value = if array.is_null(i) {
                            FieldValue::Null
                        } else {
                            FieldValue::Text(array.value(i).to_string())
                        };
                        record.insert(name.as_str(), value);
                    }
                }
                other => {
                    return Err(DataHubError::DataError(format!(
                        "Unsupported column type {:?} for {}",
                        other, name
                    )))
                }
            }
        }

        Ok(records)
    }

    fn snapshot_from_reader<R: Read + Seek>(reader: FileReader<R>) -> Result<TableSnapshot> {
        let schema = reader.schema();
        let metadata = schema.metadata();
        let table_name = metadata
            .get(TABLE_NAME_KEY)
            .cloned()
            .ok_or_else(|| DataHubError::DataError("Arrow file has no table_name metadata".to_string()))?;
        let captured_at = metadata
            .get(CAPTURED_AT_KEY)
            .ok_or_else(|| DataHubError::DataError("Arrow file has no captured_at metadata".to_string()))?;
        let captured_at = DateTime::parse_from_rfc3339(captured_at)?.with_timezone(&Utc);

        let mut records = Vec::new();
        for batch in reader {
            records.extend(record_batch_to_records(&batch?)?);
        }

        TableSnapshot::new(&table_name, records, captured_at)
    }

    // Read a table snapshot from an Arrow IPC file
    pub fn read_snapshot_from_arrow(path: &Path) -> Result<TableSnapshot> {
        let file = File::open(path)?;
        let reader = FileReader::try_new(file, None)?;
        snapshot_from_reader(reader)
    }

    // Write a batch to `path` via a sibling temp file and rename, so readers see old or new
    pub fn save_batch_atomically(batch: &RecordBatch, path: &Path) -> Result<()> {
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let tmp = tempfile::NamedTempFile::new_in(dir)?;

        {
            let mut writer = FileWriter::try_new(tmp.as_file(), &batch.schema())?;
            writer.write(batch)?;
            writer.finish()?;
        }
        tmp.as_file().sync_all()?;

        tmp.persist(path).map_err(|e| DataHubError::IoError(e.error))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::arrow_utils::*;
    use super::*;
    use crate::models::{FieldValue, NormalizedRecord};
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn numeric_cleaning_strips_separators() {
        assert_eq!(clean_numeric_value(&json!("1,234.50")), Some(1234.5));
        assert_eq!(clean_numeric_value(&json!("-2.35 %")), Some(-2.35));
        assert_eq!(clean_numeric_value(&json!(17)), Some(17.0));
        assert_eq!(clean_numeric_value(&json!("-")), None);
        assert_eq!(clean_numeric_value(&json!("N/A")), None);
        assert_eq!(clean_numeric_value(&json!("")), None);
        assert_eq!(clean_numeric_value(&json!("abc")), None);
        assert_eq!(clean_numeric_value(&Value::Null), None);
    }

    #[test]
    fn string_cleaning_maps_placeholders() {
        assert_eq!(clean_string_value(&json!("  INFY ")), Some("INFY".to_string()));
        assert_eq!(clean_string_value(&json!("null")), None);
        assert_eq!(clean_string_value(&json!("-")), None);
        assert_eq!(clean_string_value(&json!(12)), Some("12".to_string()));
    }

    #[test]
    fn table_names_are_restricted() {
        assert!(is_valid_table_name("top_gainers_2"));
        assert!(!is_valid_table_name("drop table;"));
        assert!(!is_valid_table_name(""));
        assert!(!is_valid_table_name("../etc"));
    }

    #[test]
    fn market_hours_in_ist() {
        // 2025-07-10 is a Thursday; 04:00 UTC is 09:30 IST
        let open = Utc.with_ymd_and_hms(2025, 7, 10, 4, 0, 0).unwrap();
        let before = Utc.with_ymd_and_hms(2025, 7, 10, 3, 30, 0).unwrap();
        let after = Utc.with_ymd_and_hms(2025, 7, 10, 10, 30, 0).unwrap();
        let saturday = Utc.with_ymd_and_hms(2025, 7, 12, 5, 0, 0).unwrap();
        assert!(is_market_open(open));
        assert!(!is_market_open(before));
        assert!(!is_market_open(after));
        assert!(!is_market_open(saturday));
    }

    #[test]
    fn arrow_batch_keeps_types_and_metadata() {
        let captured = Utc.with_ymd_and_hms(2025, 7, 10, 4, 0, 0).unwrap();
        let records = vec![
            NormalizedRecord::new()
                .with("symbol", "INFY")
                .with("ltp", 1500.5)
                .with("series", Option::<String>::None),
            NormalizedRecord::new()
                .with("symbol", "TCS")
                .with("ltp", Option::<f64>::None)
                .with("series", "EQ"),
        ];

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("top_gainers.arrow");
        let batch = records_to_record_batch("top_gainers", &records, captured).unwrap();
        save_batch_atomically(&batch, &path).unwrap();

        let snapshot = read_snapshot_from_arrow(&path).unwrap();
        assert_eq!(snapshot.table_name, "top_gainers");
        assert_eq!(snapshot.captured_at, captured);
        assert_eq!(snapshot.records, records);
        assert_eq!(snapshot.records[1].get("ltp"), Some(&FieldValue::Null));
    }
}
