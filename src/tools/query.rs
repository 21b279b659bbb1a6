//! `query`: find documents with paging metadata.

use bson::{doc, Document};
use serde_json::{Map, Value as JsonValue};

use crate::convert::{
    document_to_json, documents_to_json, get_optional_object, get_optional_u64,
    json_map_to_document, to_i64,
};
use crate::error::Result;
use crate::gateway::{CollectionHandle, CountOptions, FindOptions};
use crate::normalize::{parse_filter, parse_sort, NormalizationMode};
use crate::schema;
use crate::tools::{parse_explain, Context, ToolDef};

const DEFAULT_LIMIT: u64 = 10;

/// Tool definition.
pub fn tool() -> ToolDef {
    ToolDef::new(
        "query",
        "Find documents in a collection. The filter is a MongoDB query object (or its JSON \
         string). Returns up to `limit` documents (default 10) after `skip`, plus metadata \
         {total, returned, skip, limit, hasMore}. Set `explain` to get the query plan instead.",
        schema!(object {
            required: { "collection": string },
            optional: {
                "filter": any,
                "projection": any,
                "sort": any,
                "limit": integer,
                "skip": integer,
                "explain": explain,
                "objectIdMode": mode
            }
        }),
    )
}

/// Validated `query` arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    /// Normalized filter.
    pub filter: Document,
    /// Projection, passed through as given.
    pub projection: Option<Document>,
    /// Sort specification.
    pub sort: Option<Document>,
    /// Page size.
    pub limit: u64,
    /// Documents to skip.
    pub skip: u64,
    /// Explain verbosity, when explaining.
    pub explain: Option<String>,
}

impl QueryRequest {
    /// Parse the argument bag.
    pub fn parse(args: &Map<String, JsonValue>, mode: NormalizationMode) -> Result<Self> {
        Ok(Self {
            filter: parse_filter("filter", args.get("filter"), mode)?,
            projection: get_optional_object(args, "projection")?
                .map(|p| json_map_to_document(&p)),
            sort: parse_sort(args.get("sort"))?,
            limit: get_optional_u64(args, "limit")?.unwrap_or(DEFAULT_LIMIT),
            skip: get_optional_u64(args, "skip")?.unwrap_or(0),
            explain: parse_explain(args)?,
        })
    }
}

/// Run a query.
pub async fn run(
    ctx: &Context<'_>,
    collection: &dyn CollectionHandle,
    req: QueryRequest,
) -> Result<JsonValue> {
    if let Some(verbosity) = req.explain {
        let mut find = doc! {
            "find": collection.name(),
            "filter": req.filter,
            "limit": to_i64(req.limit),
            "skip": to_i64(req.skip),
        };
        if let Some(sort) = req.sort {
            find.insert("sort", sort);
        }
        if let Some(projection) = req.projection {
            find.insert("projection", projection);
        }
        let plan = ctx
            .call(ctx.gateway().command(doc! { "explain": find, "verbosity": verbosity }))
            .await?;
        return Ok(document_to_json(plan));
    }

    let options = FindOptions {
        limit: req.limit,
        skip: req.skip,
        sort: req.sort,
        projection: req.projection,
    };
    let (total, documents) = tokio::try_join!(
        ctx.call(collection.count_documents(req.filter.clone(), CountOptions::default())),
        ctx.call(collection.find(req.filter, options)),
    )?;

    let returned = documents.len() as u64;
    Ok(serde_json::json!({
        "results": documents_to_json(documents),
        "metadata": {
            "total": total,
            "returned": returned,
            "skip": req.skip,
            "limit": req.limit,
            "hasMore": req.skip + returned < total,
        }
    }))
}
