//! `count`: count documents matching a query.

use bson::{doc, Bson, Document};
use serde_json::{Map, Value as JsonValue};

use crate::convert::{get_optional_object, get_optional_u64, json_map_to_document};
use crate::error::{McpError, Result};
use crate::gateway::{CollectionHandle, CountOptions};
use crate::normalize::{parse_filter, NormalizationMode};
use crate::schema;
use crate::tools::{Context, ToolDef};

/// Tool definition.
pub fn tool() -> ToolDef {
    ToolDef::new(
        "count",
        "Count documents in a collection matching `query`. Optional `limit`, `skip`, \
         `hint` (index name or key pattern), `readConcern`, `maxTimeMS` and `collation`.",
        schema!(object {
            required: { "collection": string },
            optional: {
                "query": any,
                "limit": integer,
                "skip": integer,
                "hint": any,
                "readConcern": any,
                "maxTimeMS": integer,
                "collation": object,
                "objectIdMode": mode
            }
        }),
    )
}

/// Validated `count` arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct CountRequest {
    /// Normalized query filter.
    pub query: Document,
    /// Options, absent ones left out.
    pub options: CountOptions,
}

impl CountRequest {
    /// Parse the argument bag.
    pub fn parse(args: &Map<String, JsonValue>, mode: NormalizationMode) -> Result<Self> {
        let hint = match args.get("hint") {
            None | Some(JsonValue::Null) => None,
            Some(JsonValue::String(name)) => Some(Bson::String(name.clone())),
            Some(JsonValue::Object(key)) => Some(Bson::Document(json_map_to_document(key))),
            Some(_) => {
                return Err(McpError::invalid(
                    "hint",
                    "Hint must be an index name or a key pattern object",
                ))
            }
        };

        let read_concern = match args.get("readConcern") {
            None | Some(JsonValue::Null) => None,
            Some(JsonValue::String(level)) => Some(doc! { "level": level.as_str() }),
            Some(JsonValue::Object(rc)) => Some(json_map_to_document(rc)),
            Some(_) => {
                return Err(McpError::invalid(
                    "readConcern",
                    "Read concern must be a level string or an object",
                ))
            }
        };

        Ok(Self {
            query: parse_filter("query", args.get("query"), mode)?,
            options: CountOptions {
                limit: get_optional_u64(args, "limit")?,
                skip: get_optional_u64(args, "skip")?,
                hint,
                read_concern,
                max_time_ms: get_optional_u64(args, "maxTimeMS")?,
                collation: get_optional_object(args, "collation")?
                    .map(|c| json_map_to_document(&c)),
            },
        })
    }
}

/// Run a count.
pub async fn run(
    ctx: &Context<'_>,
    collection: &dyn CollectionHandle,
    req: CountRequest,
) -> Result<JsonValue> {
    let count = ctx
        .call(collection.count_documents(req.query, req.options))
        .await?;
    Ok(serde_json::json!({ "count": count, "ok": 1 }))
}
