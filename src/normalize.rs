//! Reinterpretation of JSON arguments as BSON filters, updates and documents.
//!
//! Clients can only send JSON, so object ids and dates arrive as strings.
//! The normalizer decides which string leaves become `ObjectId` or
//! `DateTime` values, controlled by a [`NormalizationMode`] and the name of
//! the field the string sits under.

use std::fmt;
use std::str::FromStr;

use bson::oid::ObjectId;
use bson::{Bson, Document};
use serde_json::{Map, Value as JsonValue};

use crate::convert::json_to_bson;
use crate::error::{McpError, Result};

/// How aggressively identifier-shaped strings are turned into `ObjectId`s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NormalizationMode {
    /// Convert only under id-like field names.
    #[default]
    Auto,
    /// Never convert.
    None,
    /// Convert every identifier-shaped string.
    Force,
}

impl NormalizationMode {
    /// Wire name of the mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            NormalizationMode::Auto => "auto",
            NormalizationMode::None => "none",
            NormalizationMode::Force => "force",
        }
    }
}

impl fmt::Display for NormalizationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NormalizationMode {
    type Err = McpError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "auto" => Ok(NormalizationMode::Auto),
            "none" => Ok(NormalizationMode::None),
            "force" => Ok(NormalizationMode::Force),
            other => Err(McpError::invalid(
                "objectIdMode",
                format!("expected one of auto, none, force; got '{}'", other),
            )),
        }
    }
}

/// True iff `s` is exactly 24 hexadecimal characters.
pub fn is_object_id(s: &str) -> bool {
    s.len() == 24 && s.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Field names the `auto` heuristic treats as holding identifiers.
///
/// Matches `_id`, `id` and anything ending in `id`, case-insensitively, so
/// `userId` qualifies and so do `paid` and `valid`.
fn is_id_field(field: &str) -> bool {
    field.to_ascii_lowercase().ends_with("id")
}

/// True iff `s` has the shape `YYYY-MM-DDTHH:MM:SS[.fff]Z`.
pub fn is_iso_timestamp(s: &str) -> bool {
    let b = s.as_bytes();
    let digits = |range: std::ops::Range<usize>| b[range].iter().all(u8::is_ascii_digit);
    let head = b.len() >= 20
        && digits(0..4)
        && b[4] == b'-'
        && digits(5..7)
        && b[7] == b'-'
        && digits(8..10)
        && b[10] == b'T'
        && digits(11..13)
        && b[13] == b':'
        && digits(14..16)
        && b[16] == b':'
        && digits(17..19);
    if !head {
        return false;
    }
    match b.len() {
        20 => b[19] == b'Z',
        24 => b[19] == b'.' && digits(20..23) && b[23] == b'Z',
        _ => false,
    }
}

fn parse_iso_timestamp(s: &str) -> Option<bson::DateTime> {
    if !is_iso_timestamp(s) {
        return None;
    }
    // Shape is right but the calendar may still reject it (month 13 etc.).
    let parsed = chrono::DateTime::parse_from_rfc3339(s).ok()?;
    Some(bson::DateTime::from_millis(parsed.timestamp_millis()))
}

/// Normalize a single string leaf.
///
/// Identifier conversion is tried first; if it does not apply, a plain ISO
/// timestamp and then an `ISODate("...")` wrapper are tried. Anything else,
/// including a wrapper around an invalid date, stays the original string.
pub fn normalize_string(s: &str, field: Option<&str>, mode: NormalizationMode) -> Bson {
    if is_object_id(s) {
        let convert = match mode {
            NormalizationMode::None => false,
            NormalizationMode::Force => true,
            NormalizationMode::Auto => field.is_some_and(is_id_field),
        };
        if convert {
            if let Ok(oid) = ObjectId::parse_str(s) {
                return Bson::ObjectId(oid);
            }
        }
    }

    if let Some(date) = parse_iso_timestamp(s) {
        return Bson::DateTime(date);
    }

    if let Some(inner) = s
        .strip_prefix("ISODate(\"")
        .and_then(|rest| rest.strip_suffix("\")"))
    {
        if let Some(date) = parse_iso_timestamp(inner) {
            return Bson::DateTime(date);
        }
    }

    Bson::String(s.to_string())
}

/// Normalize a JSON tree, returning a structurally identical BSON tree.
pub fn normalize(value: &JsonValue, mode: NormalizationMode) -> Bson {
    normalize_field(value, None, mode)
}

/// Normalize a JSON object into a BSON document.
pub fn normalize_document(map: &Map<String, JsonValue>, mode: NormalizationMode) -> Document {
    normalize_object(map, None, mode)
}

fn normalize_field(value: &JsonValue, field: Option<&str>, mode: NormalizationMode) -> Bson {
    match value {
        JsonValue::Object(map) => Bson::Document(normalize_object(map, field, mode)),
        // Elements take the field name of the array itself.
        JsonValue::Array(items) => Bson::Array(
            items
                .iter()
                .map(|item| normalize_field(item, field, mode))
                .collect(),
        ),
        JsonValue::String(s) => normalize_string(s, field, mode),
        other => json_to_bson(other),
    }
}

fn normalize_object(
    map: &Map<String, JsonValue>,
    parent: Option<&str>,
    mode: NormalizationMode,
) -> Document {
    map.iter()
        .map(|(key, value)| {
            // Operators such as $in or $ne apply to the enclosing field.
            // `$id` (DBRef) is an identifier field in its own right.
            let field = if key.starts_with('$') && !is_id_field(key) {
                parent
            } else {
                Some(key.as_str())
            };
            (key.clone(), normalize_field(value, field, mode))
        })
        .collect()
}

fn is_falsy(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => true,
        JsonValue::Bool(b) => !b,
        JsonValue::Number(n) => n.as_f64() == Some(0.0),
        JsonValue::String(s) => s.is_empty(),
        _ => false,
    }
}

/// Parse and normalize a filter argument.
///
/// Accepts an object or a JSON string encoding one. An absent or falsy value
/// is the empty filter. Arrays and other scalars are rejected.
pub fn parse_filter(
    name: &str,
    value: Option<&JsonValue>,
    mode: NormalizationMode,
) -> Result<Document> {
    let value = match value {
        None => return Ok(Document::new()),
        Some(v) if is_falsy(v) => return Ok(Document::new()),
        Some(v) => v,
    };

    let parsed;
    let value = match value {
        JsonValue::String(s) => {
            parsed = serde_json::from_str::<JsonValue>(s)
                .map_err(|e| McpError::invalid(name, format!("Invalid JSON filter: {}", e)))?;
            if parsed.is_null() {
                return Ok(Document::new());
            }
            &parsed
        }
        other => other,
    };

    match value {
        JsonValue::Object(map) => Ok(normalize_document(map, mode)),
        JsonValue::Array(_) => Err(McpError::invalid(
            name,
            "Filter must be an object, not an array",
        )),
        _ => Err(McpError::invalid(name, "Filter must be an object")),
    }
}

/// Parse a sort specification.
///
/// Each value must be `1`, `-1`, `asc`/`ascending`, `desc`/`descending` or a
/// `{"$meta": ...}` object. Absent or `null` means no sort.
pub fn parse_sort(value: Option<&JsonValue>) -> Result<Option<Document>> {
    let parsed;
    let map = match value {
        None | Some(JsonValue::Null) => return Ok(None),
        Some(JsonValue::Object(map)) => map,
        Some(JsonValue::String(s)) => {
            parsed = serde_json::from_str::<JsonValue>(s)
                .map_err(|e| McpError::invalid("sort", format!("Invalid JSON sort: {}", e)))?;
            match &parsed {
                JsonValue::Object(map) => map,
                _ => return Err(McpError::invalid("sort", "Sort must be an object")),
            }
        }
        Some(_) => return Err(McpError::invalid("sort", "Sort must be an object")),
    };

    let mut sort = Document::new();
    for (field, direction) in map {
        let direction = match direction {
            JsonValue::Number(n) if n.as_i64() == Some(1) => Bson::Int32(1),
            JsonValue::Number(n) if n.as_i64() == Some(-1) => Bson::Int32(-1),
            JsonValue::String(s) => match s.to_ascii_lowercase().as_str() {
                "asc" | "ascending" => Bson::Int32(1),
                "desc" | "descending" => Bson::Int32(-1),
                _ => return Err(invalid_direction(field)),
            },
            JsonValue::Object(meta) if meta.len() == 1 && meta.contains_key("$meta") => {
                json_to_bson(direction)
            }
            _ => return Err(invalid_direction(field)),
        };
        sort.insert(field.clone(), direction);
    }
    Ok(Some(sort))
}

fn invalid_direction(field: &str) -> McpError {
    McpError::invalid(
        "sort",
        format!(
            "Invalid sort direction for '{}': use 1, -1, 'asc', 'desc' or {{\"$meta\": ...}}",
            field
        ),
    )
}
