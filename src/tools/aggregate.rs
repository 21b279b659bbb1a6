//! `aggregate`: run an aggregation pipeline.

use bson::{doc, Bson, Document};
use serde_json::{Map, Value as JsonValue};

use crate::convert::{document_to_json, documents_to_json};
use crate::error::{McpError, Result};
use crate::gateway::CollectionHandle;
use crate::normalize::{normalize_document, NormalizationMode};
use crate::schema;
use crate::tools::{parse_explain, Context, ToolDef};

/// Tool definition.
pub fn tool() -> ToolDef {
    ToolDef::new(
        "aggregate",
        "Run an aggregation pipeline (array of stage objects) on a collection. \
         Returns {results, metadata: {returned}}, or the explained plan when `explain` is set.",
        schema!(object {
            required: { "collection": string, "pipeline": array_object },
            optional: { "explain": explain, "objectIdMode": mode }
        }),
    )
}

/// Validated `aggregate` arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateRequest {
    /// Normalized stages.
    pub pipeline: Vec<Document>,
    /// Explain verbosity, when explaining.
    pub explain: Option<String>,
}

impl AggregateRequest {
    /// Parse the argument bag.
    pub fn parse(args: &Map<String, JsonValue>, mode: NormalizationMode) -> Result<Self> {
        let parsed;
        let stages = match args.get("pipeline") {
            None | Some(JsonValue::Null) => return Err(McpError::MissingArg("pipeline".into())),
            Some(JsonValue::Array(stages)) => stages,
            Some(JsonValue::String(s)) => {
                parsed = serde_json::from_str::<JsonValue>(s).map_err(|e| {
                    McpError::invalid("pipeline", format!("Invalid JSON pipeline: {}", e))
                })?;
                parsed
                    .as_array()
                    .ok_or_else(|| McpError::invalid("pipeline", "Pipeline must be an array"))?
            }
            Some(_) => return Err(McpError::invalid("pipeline", "Pipeline must be an array")),
        };

        let pipeline = stages
            .iter()
            .enumerate()
            .map(|(i, stage)| match stage {
                JsonValue::Object(map) => Ok(normalize_document(map, mode)),
                _ => Err(McpError::invalid(
                    "pipeline",
                    format!("Stage {} must be an object", i),
                )),
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            pipeline,
            explain: parse_explain(args)?,
        })
    }
}

/// Run an aggregation.
pub async fn run(
    ctx: &Context<'_>,
    collection: &dyn CollectionHandle,
    req: AggregateRequest,
) -> Result<JsonValue> {
    if let Some(verbosity) = req.explain {
        let stages: Vec<Bson> = req.pipeline.into_iter().map(Bson::Document).collect();
        let command = doc! {
            "explain": {
                "aggregate": collection.name(),
                "pipeline": stages,
                "cursor": {},
            },
            "verbosity": verbosity,
        };
        let plan = ctx.call(ctx.gateway().command(command)).await?;
        return Ok(document_to_json(plan));
    }

    let documents = ctx.call(collection.aggregate(req.pipeline)).await?;
    let returned = documents.len();
    Ok(serde_json::json!({
        "results": documents_to_json(documents),
        "metadata": { "returned": returned }
    }))
}
