//! `update`: modify one or many documents with update operators.

use bson::Document;
use serde_json::{Map, Value as JsonValue};

use crate::convert::{bson_to_json, get_optional_bool, get_optional_object};
use crate::error::{McpError, Result};
use crate::gateway::{CollectionHandle, UpdateOptions};
use crate::normalize::{normalize_document, parse_filter, NormalizationMode};
use crate::schema;
use crate::tools::{Context, ToolDef};

/// Update operators an update document may use.
pub const UPDATE_OPERATORS: [&str; 9] = [
    "$set", "$unset", "$inc", "$push", "$pull", "$addToSet", "$pop", "$rename", "$mul",
];

/// Tool definition.
pub fn tool() -> ToolDef {
    ToolDef::new(
        "update",
        "Update documents matching a filter. The update must use operators \
         ($set, $unset, $inc, $push, $pull, $addToSet, $pop, $rename, $mul). \
         Set `multi` to update every match and `upsert` to insert when nothing matches.",
        schema!(object {
            required: { "collection": string, "filter": any, "update": object },
            optional: { "upsert": boolean, "multi": boolean, "objectIdMode": mode }
        }),
    )
}

/// Validated `update` arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateRequest {
    /// Normalized filter.
    pub filter: Document,
    /// Normalized update document.
    pub update: Document,
    /// Upsert / multi flags.
    pub options: UpdateOptions,
}

impl UpdateRequest {
    /// Parse the argument bag.
    pub fn parse(args: &Map<String, JsonValue>, mode: NormalizationMode) -> Result<Self> {
        // An explicit `{}` is needed to target every document.
        let filter = match args.get("filter") {
            None | Some(JsonValue::Null) => return Err(McpError::MissingArg("filter".to_string())),
            some => parse_filter("filter", some, mode)?,
        };

        let update = match args.get("update") {
            Some(JsonValue::Array(_)) => {
                return Err(McpError::invalid(
                    "update",
                    "Update must be an object, not an array",
                ))
            }
            _ => get_optional_object(args, "update")?
                .ok_or_else(|| McpError::MissingArg("update".to_string()))?,
        };
        if !update.keys().any(|k| UPDATE_OPERATORS.contains(&k.as_str())) {
            return Err(McpError::invalid(
                "update",
                format!(
                    "Update must contain at least one valid operator ({})",
                    UPDATE_OPERATORS.join(", ")
                ),
            ));
        }

        Ok(Self {
            filter,
            update: normalize_document(&update, mode),
            options: UpdateOptions {
                upsert: get_optional_bool(args, "upsert")?.unwrap_or(false),
                multi: get_optional_bool(args, "multi")?.unwrap_or(false),
            },
        })
    }
}

/// Run an update.
pub async fn run(
    ctx: &Context<'_>,
    collection: &dyn CollectionHandle,
    req: UpdateRequest,
) -> Result<JsonValue> {
    let outcome = ctx
        .call(collection.update(req.filter, req.update, req.options))
        .await?;

    let upserted_count = u64::from(outcome.upserted_id.is_some());
    Ok(serde_json::json!({
        "matchedCount": outcome.matched_count,
        "modifiedCount": outcome.modified_count,
        "upsertedCount": upserted_count,
        "upsertedId": outcome.upserted_id.map(bson_to_json),
    }))
}
