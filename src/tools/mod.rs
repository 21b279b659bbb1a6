//! Operation registry, routing and shared handler plumbing.
//!
//! [`ToolRegistry::execute`] is the single entry point of the operation
//! core: it validates the operation name, applies the read-only and
//! collection policies, parses the argument bag into a typed request and
//! runs the matching handler.

pub mod aggregate;
pub mod count;
pub mod create_index;
pub mod insert;
pub mod list_collections;
pub mod query;
pub mod server_info;
pub mod update;

use std::future::Future;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use tokio_util::sync::CancellationToken;

use crate::convert::get_optional_string;
use crate::error::{McpError, Result};
use crate::gateway::{CollectionHandle, Gateway, GatewayResult};
use crate::normalize::NormalizationMode;
use crate::policy::{self, Operation};
use crate::session::McpSession;

/// A tool definition for the MCP tools/list response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDef {
    /// Tool name (e.g., "query")
    pub name: String,
    /// Tool description
    pub description: String,
    /// JSON Schema for the input parameters
    #[serde(rename = "inputSchema")]
    pub input_schema: JsonValue,
}

impl ToolDef {
    /// Create a new tool definition.
    pub fn new(name: &str, description: &str, input_schema: JsonValue) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            input_schema,
        }
    }
}

/// A parsed, validated request for one operation.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationRequest {
    /// `query`
    Query(query::QueryRequest),
    /// `aggregate`
    Aggregate(aggregate::AggregateRequest),
    /// `update`
    Update(update::UpdateRequest),
    /// `insert`
    Insert(insert::InsertRequest),
    /// `createIndex`
    CreateIndex(create_index::CreateIndexRequest),
    /// `count`
    Count(count::CountRequest),
    /// `listCollections`
    ListCollections(list_collections::ListCollectionsRequest),
    /// `serverInfo`
    ServerInfo(server_info::ServerInfoRequest),
}

impl OperationRequest {
    /// Parse the argument bag for `operation`.
    pub fn parse(
        operation: Operation,
        args: &Map<String, JsonValue>,
        mode: NormalizationMode,
    ) -> Result<Self> {
        Ok(match operation {
            Operation::Query => Self::Query(query::QueryRequest::parse(args, mode)?),
            Operation::Aggregate => Self::Aggregate(aggregate::AggregateRequest::parse(args, mode)?),
            Operation::Update => Self::Update(update::UpdateRequest::parse(args, mode)?),
            Operation::Insert => Self::Insert(insert::InsertRequest::parse(args, mode)?),
            Operation::CreateIndex => {
                Self::CreateIndex(create_index::CreateIndexRequest::parse(args, mode)?)
            }
            Operation::Count => Self::Count(count::CountRequest::parse(args, mode)?),
            Operation::ListCollections => Self::ListCollections(
                list_collections::ListCollectionsRequest::parse(args, mode)?,
            ),
            Operation::ServerInfo => {
                Self::ServerInfo(server_info::ServerInfoRequest::parse(args)?)
            }
        })
    }

    async fn run(
        self,
        ctx: &Context<'_>,
        collection: Option<&dyn CollectionHandle>,
    ) -> Result<JsonValue> {
        match self {
            Self::Query(req) => query::run(ctx, required(collection)?, req).await,
            Self::Aggregate(req) => aggregate::run(ctx, required(collection)?, req).await,
            Self::Update(req) => update::run(ctx, required(collection)?, req).await,
            Self::Insert(req) => insert::run(ctx, required(collection)?, req).await,
            Self::CreateIndex(req) => create_index::run(ctx, required(collection)?, req).await,
            Self::Count(req) => count::run(ctx, required(collection)?, req).await,
            Self::ListCollections(req) => list_collections::run(ctx, req).await,
            Self::ServerInfo(req) => server_info::run(ctx, req).await,
        }
    }
}

fn required(collection: Option<&dyn CollectionHandle>) -> Result<&dyn CollectionHandle> {
    collection.ok_or_else(|| McpError::Internal("collection handle was not resolved".to_string()))
}

/// Per-request state shared by the handlers.
pub struct Context<'a> {
    /// Operation being executed.
    pub operation: Operation,
    /// Target collection name, if any.
    pub collection: Option<&'a str>,
    /// Session the request runs in.
    pub session: &'a McpSession,
    /// Cancellation signal from the caller.
    pub cancel: &'a CancellationToken,
}

impl Context<'_> {
    /// The data store gateway.
    pub fn gateway(&self) -> &dyn Gateway {
        self.session.gateway()
    }

    /// Await a gateway call, aborting if the request is cancelled and
    /// annotating failures with the operation and collection.
    pub async fn call<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = GatewayResult<T>>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(McpError::Cancelled {
                operation: self.operation,
                collection: self.collection.map(str::to_string),
            }),
            res = fut => res.map_err(|e| McpError::Gateway {
                operation: self.operation,
                collection: self.collection.map(str::to_string),
                message: e.0,
            }),
        }
    }
}

/// Wrap a payload in the MCP tool-result envelope.
pub fn envelope(payload: &JsonValue) -> JsonValue {
    serde_json::json!({
        "content": [{
            "type": "text",
            "text": serde_json::to_string_pretty(payload).unwrap_or_else(|_| "null".to_string())
        }]
    })
}

/// Parse the `explain` argument into a verbosity.
pub(crate) fn parse_explain(args: &Map<String, JsonValue>) -> Result<Option<String>> {
    match args.get("explain") {
        None | Some(JsonValue::Null) | Some(JsonValue::Bool(false)) => Ok(None),
        Some(JsonValue::Bool(true)) => Ok(Some("queryPlanner".to_string())),
        Some(JsonValue::String(s))
            if matches!(
                s.as_str(),
                "queryPlanner" | "executionStats" | "allPlansExecution"
            ) =>
        {
            Ok(Some(s.clone()))
        }
        Some(_) => Err(McpError::invalid(
            "explain",
            "Expected queryPlanner, executionStats or allPlansExecution",
        )),
    }
}

/// Registry of all available tools.
pub struct ToolRegistry {
    tools: Vec<ToolDef>,
}

impl ToolRegistry {
    /// Create a new registry with all tools registered.
    pub fn new() -> Self {
        let tools = vec![
            query::tool(),
            aggregate::tool(),
            update::tool(),
            server_info::tool(),
            insert::tool(),
            create_index::tool(),
            count::tool(),
            list_collections::tool(),
        ];
        Self { tools }
    }

    /// Get all tool definitions.
    pub fn tools(&self) -> &[ToolDef] {
        &self.tools
    }

    /// Execute a named operation against the session's gateway.
    ///
    /// Policy checks run before any argument parsing or data store call.
    pub async fn execute(
        &self,
        session: &McpSession,
        name: &str,
        args: Map<String, JsonValue>,
        cancel: &CancellationToken,
    ) -> Result<JsonValue> {
        let operation: Operation = name.parse().inspect_err(|_| {
            tracing::warn!(operation = name, "rejected unknown operation");
        })?;

        session.check_write_access(operation).inspect_err(|_| {
            tracing::warn!(%operation, "rejected write in read-only mode");
        })?;

        let handle = if operation.requires_collection() {
            let name = match args.get("collection") {
                Some(JsonValue::String(s)) => s.as_str(),
                _ => return Err(McpError::MissingCollection { operation }),
            };
            policy::check_collection(operation, name).inspect_err(|_| {
                tracing::warn!(%operation, collection = name, "rejected forbidden collection");
            })?;
            Some(session.gateway().collection(name))
        } else {
            None
        };
        let collection = handle.as_deref();
        let collection_name = collection.map(|c| c.name());

        let request = resolve_mode(&args, session.object_id_mode())
            .and_then(|mode| OperationRequest::parse(operation, &args, mode))
            .map_err(|e| McpError::Failed {
                operation,
                collection: collection_name.map(str::to_string),
                source: Box::new(e),
            })?;

        tracing::debug!(%operation, collection = collection_name, "dispatching operation");

        let ctx = Context {
            operation,
            collection: collection_name,
            session,
            cancel,
        };
        request.run(&ctx, collection).await
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-request `objectIdMode` overrides the server default.
fn resolve_mode(
    args: &Map<String, JsonValue>,
    default: NormalizationMode,
) -> Result<NormalizationMode> {
    match get_optional_string(args, "objectIdMode") {
        Some(mode) => mode.parse(),
        None => Ok(default),
    }
}

/// Helper macro for creating JSON Schema for tool input parameters.
#[macro_export]
macro_rules! schema {
    // Object with required and optional properties
    (object {
        required: { $($req_name:literal : $req_type:tt),* $(,)? },
        optional: { $($opt_name:literal : $opt_type:tt),* $(,)? }
    }) => {{
        let mut required: Vec<&str> = Vec::new();
        $(required.push($req_name);)*

        let mut props = serde_json::Map::new();
        $(props.insert($req_name.to_string(), schema!(@type $req_type));)*
        $(props.insert($opt_name.to_string(), schema!(@type $opt_type));)*

        serde_json::json!({
            "type": "object",
            "properties": props,
            "required": required
        })
    }};

    // Object with only optional properties
    (object {
        optional: { $($opt_name:literal : $opt_type:tt),* $(,)? }
    }) => {{
        let mut props = serde_json::Map::new();
        $(props.insert($opt_name.to_string(), schema!(@type $opt_type));)*

        serde_json::json!({
            "type": "object",
            "properties": props,
            "required": []
        })
    }};

    // Type mappings
    (@type string) => { serde_json::json!({"type": "string"}) };
    (@type integer) => { serde_json::json!({"type": "integer"}) };
    (@type boolean) => { serde_json::json!({"type": "boolean"}) };
    (@type object) => { serde_json::json!({"type": "object"}) };
    (@type any) => { serde_json::json!({}) };
    (@type mode) => { serde_json::json!({"type": "string", "enum": ["auto", "none", "force"]}) };
    (@type explain) => {
        serde_json::json!({"enum": [true, false, "queryPlanner", "executionStats", "allPlansExecution"]})
    };
    (@type array_object) => { serde_json::json!({"type": "array", "items": {"type": "object"}}) };
}
