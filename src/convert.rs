//! Conversion utilities between JSON and BSON, plus argument helpers.
//!
//! Tool arguments arrive as `serde_json` maps; the data store speaks BSON.
//! Results go back to the client as relaxed extended JSON.

use bson::{Bson, Document};
use serde_json::{Map, Value as JsonValue};

use crate::error::{McpError, Result};

/// Convert a JSON value to BSON without any reinterpretation of strings.
///
/// Integers that fit in 32 bits become `Int32`, matching what the shell
/// sends for literals like `1` in sort and index specs.
pub fn json_to_bson(json: &JsonValue) -> Bson {
    match json {
        JsonValue::Null => Bson::Null,
        JsonValue::Bool(b) => Bson::Boolean(*b),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                i32::try_from(i).map(Bson::Int32).unwrap_or(Bson::Int64(i))
            } else {
                n.as_f64().map(Bson::Double).unwrap_or(Bson::Null)
            }
        }
        JsonValue::String(s) => Bson::String(s.clone()),
        JsonValue::Array(arr) => Bson::Array(arr.iter().map(json_to_bson).collect()),
        JsonValue::Object(map) => Bson::Document(json_map_to_document(map)),
    }
}

/// Convert a JSON object to a BSON document.
pub fn json_map_to_document(map: &Map<String, JsonValue>) -> Document {
    map.iter().map(|(k, v)| (k.clone(), json_to_bson(v))).collect()
}

/// Convert BSON to relaxed extended JSON.
pub fn bson_to_json(value: Bson) -> JsonValue {
    value.into_relaxed_extjson()
}

/// Convert a BSON document to relaxed extended JSON.
pub fn document_to_json(doc: Document) -> JsonValue {
    bson_to_json(Bson::Document(doc))
}

/// Convert a list of documents to a JSON array.
pub fn documents_to_json(docs: Vec<Document>) -> JsonValue {
    JsonValue::Array(docs.into_iter().map(document_to_json).collect())
}

/// Clamp an unsigned count into the signed range BSON integers use.
pub fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Read a numeric BSON field as an unsigned count.
pub fn bson_as_u64(value: Option<&Bson>) -> Option<u64> {
    match value? {
        Bson::Int32(i) => u64::try_from(*i).ok(),
        Bson::Int64(i) => u64::try_from(*i).ok(),
        Bson::Double(f) if *f >= 0.0 && f.fract() == 0.0 => Some(*f as u64),
        _ => None,
    }
}

/// Helper to get an optional string argument from JSON arguments.
pub fn get_optional_string(args: &Map<String, JsonValue>, name: &str) -> Option<String> {
    args.get(name).and_then(|v| v.as_str()).map(|s| s.to_string())
}

/// Helper to get an optional non-negative integer argument.
///
/// Accepts JSON integers, integral floats and numeric strings; `null` counts
/// as absent.
pub fn get_optional_u64(args: &Map<String, JsonValue>, name: &str) -> Result<Option<u64>> {
    let invalid = || McpError::invalid(name, "Expected a non-negative integer");
    match args.get(name) {
        None | Some(JsonValue::Null) => Ok(None),
        Some(JsonValue::Number(n)) => {
            if let Some(u) = n.as_u64() {
                Ok(Some(u))
            } else {
                match n.as_f64() {
                    Some(f) if f >= 0.0 && f.fract() == 0.0 => Ok(Some(f as u64)),
                    _ => Err(invalid()),
                }
            }
        }
        Some(JsonValue::String(s)) => s.trim().parse::<u64>().map(Some).map_err(|_| invalid()),
        Some(_) => Err(invalid()),
    }
}

/// Helper to get an optional boolean argument.
///
/// `"true"` and `"false"` strings are accepted as well.
pub fn get_optional_bool(args: &Map<String, JsonValue>, name: &str) -> Result<Option<bool>> {
    match args.get(name) {
        None | Some(JsonValue::Null) => Ok(None),
        Some(JsonValue::Bool(b)) => Ok(Some(*b)),
        Some(JsonValue::String(s)) if s == "true" => Ok(Some(true)),
        Some(JsonValue::String(s)) if s == "false" => Ok(Some(false)),
        Some(_) => Err(McpError::invalid(name, "Expected a boolean")),
    }
}

/// Helper to get an optional object argument, which may also arrive as a
/// JSON-encoded string.
pub fn get_optional_object(
    args: &Map<String, JsonValue>,
    name: &str,
) -> Result<Option<Map<String, JsonValue>>> {
    match args.get(name) {
        None | Some(JsonValue::Null) => Ok(None),
        Some(JsonValue::Object(map)) => Ok(Some(map.clone())),
        Some(JsonValue::String(s)) => match serde_json::from_str::<JsonValue>(s) {
            Ok(JsonValue::Object(map)) => Ok(Some(map)),
            Ok(_) => Err(McpError::invalid(name, "Expected a JSON object")),
            Err(e) => Err(McpError::invalid(name, format!("Invalid JSON: {}", e))),
        },
        Some(_) => Err(McpError::invalid(name, "Expected an object")),
    }
}
