use crate::errors::{DataHubError, Result};
use crate::models::{FieldValue, NormalizedRecord};
use crate::scrapers::datasets::{
    Dataset, Endpoint, FieldKind, FieldMapping, RecordLayout, RowSource, CATEGORY_COLUMN, INDEX_NAME_COLUMN,
};
use crate::util::{clean_numeric_value, clean_string_value};
use log::{debug, warn};
use serde_json::Value;

/// Normalize one endpoint payload of `dataset`.
///
/// `index_name` tags rows of per-index datasets.
pub fn normalize_dataset(
    dataset: &Dataset,
    payload: &Value,
    index_name: Option<&str>,
) -> Result<Vec<NormalizedRecord>> {
    let mut context = Vec::new();
    if matches!(dataset.endpoint, Endpoint::PerIndex(_)) {
        context.push((INDEX_NAME_COLUMN, FieldValue::from(index_name)));
    }
    normalize_payload(&dataset.layout, payload, &context)
}

/// Walk the layout's rows and emit one record per row with exactly the layout's columns.
pub fn normalize_payload(
    layout: &RecordLayout,
    payload: &Value,
    context: &[(&str, FieldValue)],
) -> Result<Vec<NormalizedRecord>> {
    let mut records = Vec::new();

    match layout.rows {
        RowSource::Pointer(pointer) => {
            for row in rows_at(payload, pointer)? {
                if let Some(record) = build_record(layout.fields, row, context) {
                    records.push(record);
                }
            }
        }
        RowSource::Grouped { rows_key, skip } => {
            let groups = payload
                .as_object()
                .ok_or_else(|| DataHubError::DataError("expected an object of groups".to_string()))?;

            for (group, group_data) in groups {
                if skip.contains(&group.as_str()) {
                    continue;
                }

                // Rows sitting directly at the top level belong to no group
                let (category, rows) = if group == rows_key {
                    (None, group_data.as_array())
                } else {
                    (Some(group.as_str()), group_data.get(rows_key).and_then(Value::as_array))
                };
                let Some(rows) = rows else {
                    debug!("Group {} has no {} array", group, rows_key);
                    continue;
                };

                let mut group_context = context.to_vec();
                group_context.push((CATEGORY_COLUMN, FieldValue::from(category)));
                for row in rows {
                    if let Some(record) = build_record(layout.fields, row, &group_context) {
                        records.push(record);
                    }
                }
            }
        }
    }

    Ok(records)
}

fn rows_at<'a>(payload: &'a Value, pointer: &str) -> Result<&'a [Value]> {
    match payload.pointer(pointer) {
        None | Some(Value::Null) => {
            debug!("Payload has no rows at {}", pointer);
            Ok(&[])
        }
        Some(Value::Array(rows)) => Ok(rows.as_slice()),
        Some(other) => Err(DataHubError::DataError(format!(
            "expected an array at {}, found {}",
            pointer,
            type_name(other)
        ))),
    }
}

fn build_record(fields: &[FieldMapping], row: &Value, context: &[(&str, FieldValue)]) -> Option<NormalizedRecord> {
    let Some(object) = row.as_object() else {
        warn!("Skipping non-object row: {}", row);
        return None;
    };

    let mut record = NormalizedRecord::new();
    for (column, value) in context {
        record.insert(*column, value.clone());
    }
    for field in fields {
        let raw = object.get(field.source).unwrap_or(&Value::Null);
        let value = match field.kind {
            FieldKind::Text => FieldValue::from(clean_string_value(raw)),
            FieldKind::Number => FieldValue::from(clean_numeric_value(raw)),
        };
        record.insert(field.column, value);
    }
    Some(record)
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
