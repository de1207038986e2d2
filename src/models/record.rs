use crate::errors::{DataHubError, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Scalar stored in a normalized column.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Number(f64),
    Null,
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<f64> for FieldValue {
    fn from(n: f64) -> Self {
        FieldValue::Number(n)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(FieldValue::Null)
    }
}

/// One row destined for a table, keyed by canonical column name.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct NormalizedRecord(BTreeMap<String, FieldValue>);

impl NormalizedRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.0.get(name)
    }

    /// Column names in sorted order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn same_shape(&self, other: &NormalizedRecord) -> bool {
        self.0.len() == other.0.len() && self.0.keys().eq(other.0.keys())
    }
}

/// Full contents of a table at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableSnapshot {
    pub table_name: String,
    pub records: Vec<NormalizedRecord>,
    pub captured_at: DateTime<Utc>,
}

impl TableSnapshot {
    /// Build a snapshot, rejecting record batches whose rows disagree on columns.
    pub fn new(table_name: &str, records: Vec<NormalizedRecord>, captured_at: DateTime<Utc>) -> Result<Self> {
        if let Some(first) = records.first() {
            if let Some(pos) = records.iter().position(|r| !r.same_shape(first)) {
                return Err(DataHubError::DataError(format!(
                    "record {} for table {} has a different field set than record 0",
                    pos, table_name
                )));
            }
        }

        Ok(Self {
            table_name: table_name.to_string(),
            records,
            captured_at,
        })
    }

    pub fn columns(&self) -> Vec<&str> {
        self.records
            .first()
            .map(|r| r.field_names().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_rejects_mismatched_shapes() {
        let a = NormalizedRecord::new().with("symbol", "INFY").with("ltp", 1500.0);
        let b = NormalizedRecord::new().with("symbol", "TCS");
        let err = TableSnapshot::new("top_gainers", vec![a, b], Utc::now()).unwrap_err();
        assert!(matches!(err, DataHubError::DataError(_)));
    }

    #[test]
    fn snapshot_columns_are_sorted() {
        let a = NormalizedRecord::new().with("symbol", "INFY").with("ltp", 1500.0);
        let snapshot = TableSnapshot::new("t", vec![a], Utc::now()).unwrap();
        assert_eq!(snapshot.columns(), vec!["ltp", "symbol"]);
    }

    #[test]
    fn null_from_none() {
        let v: FieldValue = Option::<f64>::None.into();
        assert!(v.is_null());
    }
}
