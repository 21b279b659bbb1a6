//! `insert`: insert a batch of documents.
//!
//! A batch where some documents fail is reported as a partial-success
//! payload, not as an error: the documents that were written stay written.

use bson::Document;
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};

use crate::convert::{bson_to_json, get_optional_bool};
use crate::error::{McpError, Result};
use crate::gateway::{CollectionHandle, InsertOutcome};
use crate::normalize::{normalize_document, NormalizationMode};
use crate::schema;
use crate::tools::{Context, ToolDef};

/// Tool definition.
pub fn tool() -> ToolDef {
    ToolDef::new(
        "insert",
        "Insert one or more documents into a collection. `documents` is a non-empty array \
         of objects. With `ordered` (default true) insertion stops at the first failure. \
         Partial failures are reported with per-document write errors.",
        schema!(object {
            required: { "collection": string, "documents": array_object },
            optional: { "ordered": boolean, "objectIdMode": mode }
        }),
    )
}

/// Validated `insert` arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertRequest {
    /// Normalized documents.
    pub documents: Vec<Document>,
    /// Stop at the first failure.
    pub ordered: bool,
}

impl InsertRequest {
    /// Parse the argument bag.
    pub fn parse(args: &Map<String, JsonValue>, mode: NormalizationMode) -> Result<Self> {
        let docs = match args.get("documents") {
            None | Some(JsonValue::Null) => return Err(McpError::MissingArg("documents".into())),
            Some(JsonValue::Array(docs)) => docs,
            Some(_) => return Err(McpError::invalid("documents", "Documents must be an array")),
        };
        if docs.is_empty() {
            return Err(McpError::invalid("documents", "Documents array cannot be empty"));
        }

        let documents = docs
            .iter()
            .enumerate()
            .map(|(i, doc)| match doc {
                JsonValue::Object(map) => Ok(normalize_document(map, mode)),
                _ => Err(McpError::invalid(
                    "documents",
                    format!("Document at index {} must be an object", i),
                )),
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            documents,
            ordered: get_optional_bool(args, "ordered")?.unwrap_or(true),
        })
    }
}

/// One failed document in a partially applied batch.
#[derive(Debug, Clone, Serialize)]
pub struct WriteErrorEntry {
    /// Batch index of the document.
    pub index: usize,
    /// Server error code.
    pub code: i32,
    /// Server error message.
    pub message: String,
}

/// Payload for a batch where some documents failed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialBulkFailure {
    /// Summary line.
    pub error: String,
    /// Per-document failures.
    pub write_errors: Vec<WriteErrorEntry>,
    /// Documents written.
    pub inserted_count: usize,
    /// Documents not written, including those skipped after an ordered failure.
    pub failed_count: usize,
}

impl PartialBulkFailure {
    fn new(submitted: usize, outcome: InsertOutcome) -> Self {
        let inserted_count = outcome.inserted_ids.len();
        Self {
            error: format!(
                "Bulk write error: {} of {} documents failed",
                submitted.saturating_sub(inserted_count),
                submitted
            ),
            write_errors: outcome
                .write_errors
                .into_iter()
                .map(|e| WriteErrorEntry {
                    index: e.index,
                    code: e.code,
                    message: e.message,
                })
                .collect(),
            inserted_count,
            failed_count: submitted.saturating_sub(inserted_count),
        }
    }
}

/// Run an insert.
pub async fn run(
    ctx: &Context<'_>,
    collection: &dyn CollectionHandle,
    req: InsertRequest,
) -> Result<JsonValue> {
    let submitted = req.documents.len();
    let outcome = ctx
        .call(collection.insert_many(req.documents, req.ordered))
        .await?;

    if !outcome.write_errors.is_empty() {
        let failure = PartialBulkFailure::new(submitted, outcome);
        tracing::warn!(
            collection = collection.name(),
            inserted = failure.inserted_count,
            failed = failure.failed_count,
            "partial bulk insert failure"
        );
        return Ok(serde_json::to_value(failure)?);
    }

    let inserted_ids: Map<String, JsonValue> = outcome
        .inserted_ids
        .into_iter()
        .map(|(index, id)| (index.to_string(), bson_to_json(id)))
        .collect();
    Ok(serde_json::json!({
        "acknowledged": true,
        "insertedCount": inserted_ids.len(),
        "insertedIds": inserted_ids,
    }))
}
