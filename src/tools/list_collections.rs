//! `listCollections`: list collections in the database.

use bson::Document;
use serde_json::{Map, Value as JsonValue};

use crate::convert::{documents_to_json, get_optional_bool, get_optional_u64};
use crate::error::Result;
use crate::normalize::{parse_filter, NormalizationMode};
use crate::schema;
use crate::tools::{Context, ToolDef};

const DEFAULT_LIMIT: u64 = 20;

/// Tool definition.
pub fn tool() -> ToolDef {
    ToolDef::new(
        "listCollections",
        "List collections in the database, optionally filtered (e.g. {\"name\": \"users\"}). \
         `nameOnly` returns just names and types. Paged with `skip` and `limit` (default 20).",
        schema!(object {
            optional: {
                "filter": any,
                "nameOnly": boolean,
                "skip": integer,
                "limit": integer,
                "objectIdMode": mode
            }
        }),
    )
}

/// Validated `listCollections` arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct ListCollectionsRequest {
    /// Normalized filter.
    pub filter: Document,
    /// Return names and types only.
    pub name_only: bool,
    /// Entries to skip.
    pub skip: u64,
    /// Page size.
    pub limit: u64,
}

impl ListCollectionsRequest {
    /// Parse the argument bag.
    pub fn parse(args: &Map<String, JsonValue>, mode: NormalizationMode) -> Result<Self> {
        Ok(Self {
            filter: parse_filter("filter", args.get("filter"), mode)?,
            name_only: get_optional_bool(args, "nameOnly")?.unwrap_or(false),
            skip: get_optional_u64(args, "skip")?.unwrap_or(0),
            limit: get_optional_u64(args, "limit")?.unwrap_or(DEFAULT_LIMIT),
        })
    }
}

/// Run a listing. Paging happens here, not on the server.
pub async fn run(ctx: &Context<'_>, req: ListCollectionsRequest) -> Result<JsonValue> {
    let all = ctx
        .call(ctx.gateway().list_collections(req.filter, req.name_only))
        .await?;

    let total = all.len() as u64;
    let page: Vec<Document> = all
        .into_iter()
        .skip(usize::try_from(req.skip).unwrap_or(usize::MAX))
        .take(usize::try_from(req.limit).unwrap_or(usize::MAX))
        .collect();
    let returned = page.len() as u64;

    Ok(serde_json::json!({
        "results": documents_to_json(page),
        "metadata": {
            "total": total,
            "returned": returned,
            "skip": req.skip,
            "limit": req.limit,
            "hasMore": req.skip + returned < total,
        }
    }))
}
