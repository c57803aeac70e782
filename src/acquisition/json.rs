//! JSON payload unwrapping.
//!
//! APIs wrap their rows differently: a bare list, an envelope object with the
//! rows under a well-known key, or a single record object.

use serde_json::{Map, Value};
use tracing::debug;

use crate::config::defaults::JSON_RECORD_KEYS;
use crate::error::{PipelineError, Result};
use crate::types::RawTable;

/// Parse a JSON document and flatten it into a table.
pub fn parse_json_bytes(bytes: &[u8], source_name: &str) -> Result<RawTable> {
    let value: Value = serde_json::from_slice(bytes)
        .map_err(|e| PipelineError::format(source_name, format!("malformed JSON: {e}")))?;
    let records = unwrap_records(value, source_name)?;
    Ok(RawTable::from_json_records(&records))
}

/// Extract the list of record objects from a payload.
///
/// - a list is used directly
/// - an object is searched for the first of [`JSON_RECORD_KEYS`] holding a list
/// - any other object is a single record
pub fn unwrap_records(value: Value, source_name: &str) -> Result<Vec<Map<String, Value>>> {
    match value {
        Value::Array(items) => records_from_list(items, source_name),
        Value::Object(mut object) => {
            for key in JSON_RECORD_KEYS {
                if matches!(object.get(*key), Some(Value::Array(_))) {
                    if let Some(Value::Array(items)) = object.remove(*key) {
                        debug!(key = *key, rows = items.len(), "Unwrapped JSON envelope");
                        return records_from_list(items, source_name);
                    }
                }
            }
            Ok(vec![object])
        }
        other => Err(PipelineError::format(
            source_name,
            format!("expected a JSON list or object, found {}", json_kind(&other)),
        )),
    }
}

fn records_from_list(items: Vec<Value>, source_name: &str) -> Result<Vec<Map<String, Value>>> {
    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::Object(record) => Ok(record),
            other => Err(PipelineError::format(
                source_name,
                format!("record {i} is {}, not an object", json_kind(&other)),
            )),
        })
        .collect()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}
