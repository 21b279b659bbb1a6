//! `createIndex`: create one or more indexes.

use bson::{Bson, Document};
use serde_json::{Map, Value as JsonValue};

use crate::convert::json_map_to_document;
use crate::error::{McpError, Result};
use crate::gateway::{CollectionHandle, CreateIndexesOptions};
use crate::normalize::{normalize_document, NormalizationMode};
use crate::schema;
use crate::tools::{Context, ToolDef};

/// Tool definition.
pub fn tool() -> ToolDef {
    ToolDef::new(
        "createIndex",
        "Create indexes on a collection. Each entry of `indexes` is an index spec with a \
         `key` object (e.g. {\"email\": 1}) and optional `name`, `unique`, `sparse`, \
         `expireAfterSeconds`, `partialFilterExpression`. Optional `writeConcern` \
         {w, j, wtimeout} and `commitQuorum` (string or number).",
        schema!(object {
            required: { "collection": string, "indexes": array_object },
            optional: { "writeConcern": object, "commitQuorum": any, "objectIdMode": mode }
        }),
    )
}

/// Validated `createIndex` arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateIndexRequest {
    /// Index specifications, each with a `name`.
    pub indexes: Vec<Document>,
    /// Write concern and commit quorum.
    pub options: CreateIndexesOptions,
}

impl CreateIndexRequest {
    /// Parse the argument bag.
    pub fn parse(args: &Map<String, JsonValue>, mode: NormalizationMode) -> Result<Self> {
        let specs = match args.get("indexes") {
            None | Some(JsonValue::Null) => return Err(McpError::MissingArg("indexes".into())),
            Some(JsonValue::Array(specs)) => specs,
            Some(_) => return Err(McpError::invalid("indexes", "Indexes must be an array")),
        };
        if specs.is_empty() {
            return Err(McpError::invalid("indexes", "Indexes array cannot be empty"));
        }

        let indexes = specs
            .iter()
            .enumerate()
            .map(|(i, spec)| parse_index_spec(i, spec, mode))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            indexes,
            options: CreateIndexesOptions {
                write_concern: parse_write_concern(args.get("writeConcern"))?,
                commit_quorum: parse_commit_quorum(args.get("commitQuorum"))?,
            },
        })
    }
}

fn parse_index_spec(i: usize, spec: &JsonValue, mode: NormalizationMode) -> Result<Document> {
    let map = spec.as_object().ok_or_else(|| {
        McpError::invalid("indexes", format!("Index at position {} must be an object", i))
    })?;
    match map.get("key") {
        Some(JsonValue::Object(key)) if !key.is_empty() => {}
        _ => {
            return Err(McpError::invalid(
                "indexes",
                format!("Index at position {} needs a non-empty 'key' object", i),
            ))
        }
    }

    let mut index = normalize_document(map, mode);
    if !index.contains_key("name") {
        let key = index.get_document("key").map(default_index_name).unwrap_or_default();
        index.insert("name", key);
    }
    Ok(index)
}

/// Server-style default name: `field_direction` pairs joined by `_`.
pub fn default_index_name(key: &Document) -> String {
    key.iter()
        .map(|(field, direction)| {
            let direction = match direction {
                Bson::Int32(n) => n.to_string(),
                Bson::Int64(n) => n.to_string(),
                Bson::Double(n) if n.fract() == 0.0 => format!("{}", *n as i64),
                Bson::String(s) => s.clone(),
                other => other.to_string(),
            };
            format!("{}_{}", field, direction)
        })
        .collect::<Vec<_>>()
        .join("_")
}

fn parse_write_concern(value: Option<&JsonValue>) -> Result<Option<Document>> {
    let map = match value {
        None | Some(JsonValue::Null) => return Ok(None),
        Some(JsonValue::Object(map)) => map,
        Some(_) => return Err(McpError::invalid("writeConcern", "Write concern must be an object")),
    };

    for (field, value) in map {
        let ok = match field.as_str() {
            "w" => value.is_string() || value.is_number(),
            "j" => value.is_boolean(),
            "wtimeout" => value.is_number(),
            _ => {
                return Err(McpError::invalid(
                    "writeConcern",
                    format!("Unknown write concern field '{}'", field),
                ))
            }
        };
        if !ok {
            return Err(McpError::invalid(
                "writeConcern",
                format!("Invalid type for write concern field '{}'", field),
            ));
        }
    }
    Ok(Some(json_map_to_document(map)))
}

fn parse_commit_quorum(value: Option<&JsonValue>) -> Result<Option<Bson>> {
    match value {
        None | Some(JsonValue::Null) => Ok(None),
        Some(JsonValue::String(s)) => Ok(Some(Bson::String(s.clone()))),
        Some(JsonValue::Number(n)) => match n.as_i64().and_then(|n| i32::try_from(n).ok()) {
            Some(n) => Ok(Some(Bson::Int32(n))),
            None => Err(McpError::invalid("commitQuorum", "Commit quorum must be an integer")),
        },
        Some(_) => Err(McpError::invalid(
            "commitQuorum",
            "Commit quorum must be a string or a number",
        )),
    }
}

/// Run index creation.
pub async fn run(
    ctx: &Context<'_>,
    collection: &dyn CollectionHandle,
    req: CreateIndexRequest,
) -> Result<JsonValue> {
    let outcome = ctx
        .call(collection.create_indexes(req.indexes, req.options))
        .await?;

    Ok(serde_json::json!({
        "acknowledged": true,
        "createdIndexes": outcome.created_indexes,
        "numIndexesBefore": outcome.num_indexes_before,
        "numIndexesAfter": outcome.num_indexes_after,
    }))
}
