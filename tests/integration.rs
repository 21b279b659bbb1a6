//! Integration tests for the MCP server.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bson::oid::ObjectId;
use bson::{doc, Bson, Document};
use serde_json::{json, Map, Value as JsonValue};
use tokio_util::sync::CancellationToken;

use mongo_mcp::gateway::{
    CountOptions, CreateIndexesOptions, CreateIndexesOutcome, FindOptions, InsertOutcome,
    UpdateOptions, UpdateOutcome, WriteFailure,
};
use mongo_mcp::{
    CollectionHandle, ErrorKind, Gateway, GatewayError, GatewayResult, McpError, McpServer,
    McpSession, NormalizationMode, ServerConfig, ToolRegistry,
};

const OID: &str = "507f1f77bcf86cd799439011";

// =============================================================================
// In-memory gateway
// =============================================================================

#[derive(Default)]
struct State {
    collections: BTreeMap<String, Vec<Document>>,
    indexes: BTreeMap<String, u64>,
    calls: Vec<String>,
    filters: Vec<Document>,
    pipelines: Vec<Vec<Document>>,
    commands: Vec<Document>,
}

#[derive(Clone, Copy, Default, PartialEq)]
enum Behavior {
    #[default]
    Normal,
    Fail,
    Hang,
    /// Hang only on calls whose log entry starts with the prefix.
    HangOn(&'static str),
}

/// Equality-only stand-in for a MongoDB database.
#[derive(Clone, Default)]
struct MemoryGateway {
    state: Arc<Mutex<State>>,
    behavior: Behavior,
}

impl MemoryGateway {
    fn with_behavior(behavior: Behavior) -> Self {
        Self {
            behavior,
            ..Default::default()
        }
    }

    fn seed(&self, collection: &str, docs: Vec<Document>) {
        let mut state = self.state.lock().unwrap();
        state
            .collections
            .entry(collection.to_string())
            .or_default()
            .extend(docs);
    }

    fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    fn documents(&self, collection: &str) -> Vec<Document> {
        let state = self.state.lock().unwrap();
        state.collections.get(collection).cloned().unwrap_or_default()
    }

    fn last_filter(&self) -> Document {
        self.state.lock().unwrap().filters.last().cloned().unwrap()
    }

    async fn enter(&self, call: String) -> GatewayResult<()> {
        self.state.lock().unwrap().calls.push(call.clone());
        match self.behavior {
            Behavior::Normal => Ok(()),
            Behavior::Fail => Err(GatewayError::new("connection refused")),
            Behavior::HangOn(prefix) if !call.starts_with(prefix) => Ok(()),
            Behavior::Hang | Behavior::HangOn(_) => {
                std::future::pending::<()>().await;
                Ok(())
            }
        }
    }
}

fn matches(doc: &Document, filter: &Document) -> bool {
    filter.iter().all(|(k, v)| doc.get(k) == Some(v))
}

#[async_trait]
impl Gateway for MemoryGateway {
    fn collection(&self, name: &str) -> Box<dyn CollectionHandle> {
        self.state
            .lock()
            .unwrap()
            .calls
            .push(format!("collection:{}", name));
        Box::new(MemoryCollection {
            name: name.to_string(),
            gateway: self.clone(),
        })
    }

    async fn command(&self, command: Document) -> GatewayResult<Document> {
        let name = command.keys().next().cloned().unwrap_or_default();
        self.enter(format!("command:{}", name)).await?;
        self.state.lock().unwrap().commands.push(command.clone());

        match name.as_str() {
            "buildInfo" => Ok(doc! {
                "version": "7.0.4",
                "gitVersion": "38f3e37057a43d2e9f41a39142681a76062d582e",
                "bits": 64,
                "debug": false,
                "maxBsonObjectSize": 16_777_216,
                "openssl": { "running": "OpenSSL 3.0.2" },
                "ok": 1.0,
            }),
            "serverStatus" => Ok(doc! {
                "host": "localhost:27017",
                "uptime": 42.0,
                "connections": { "current": 3, "available": 100 },
                "opcounters": { "query": 7 },
                "asserts": { "regular": 0 },
                "ok": 1.0,
            }),
            "explain" => Ok(doc! {
                "queryPlanner": { "winningPlan": { "stage": "COLLSCAN" } },
                "command": command.get_document("explain").cloned().unwrap_or_default(),
                "verbosity": command.get_str("verbosity").unwrap_or_default(),
                "ok": 1.0,
            }),
            other => Err(GatewayError::new(format!("no such command: '{}'", other))),
        }
    }

    async fn list_collections(
        &self,
        filter: Document,
        name_only: bool,
    ) -> GatewayResult<Vec<Document>> {
        self.enter("listCollections".to_string()).await?;
        let state = self.state.lock().unwrap();
        Ok(state
            .collections
            .keys()
            .map(|name| {
                let mut entry = doc! { "name": name.as_str(), "type": "collection" };
                if !name_only {
                    entry.insert("options", doc! {});
                }
                entry
            })
            .filter(|entry| matches(entry, &filter))
            .collect())
    }
}

struct MemoryCollection {
    name: String,
    gateway: MemoryGateway,
}

#[async_trait]
impl CollectionHandle for MemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn find(&self, filter: Document, options: FindOptions) -> GatewayResult<Vec<Document>> {
        self.gateway.enter(format!("find:{}", self.name)).await?;
        let mut state = self.gateway.state.lock().unwrap();
        state.filters.push(filter.clone());
        let docs = state.collections.get(&self.name).cloned().unwrap_or_default();
        let limit = if options.limit == 0 {
            usize::MAX
        } else {
            options.limit as usize
        };
        Ok(docs
            .into_iter()
            .filter(|d| matches(d, &filter))
            .skip(options.skip as usize)
            .take(limit)
            .collect())
    }

    async fn count_documents(
        &self,
        filter: Document,
        options: CountOptions,
    ) -> GatewayResult<u64> {
        self.gateway.enter(format!("count:{}", self.name)).await?;
        let mut state = self.gateway.state.lock().unwrap();
        state.filters.push(filter.clone());
        let docs = state.collections.get(&self.name).cloned().unwrap_or_default();
        let n = docs
            .iter()
            .filter(|d| matches(d, &filter))
            .skip(options.skip.unwrap_or(0) as usize)
            .take(options.limit.map_or(usize::MAX, |l| l as usize))
            .count();
        Ok(n as u64)
    }

    async fn aggregate(&self, pipeline: Vec<Document>) -> GatewayResult<Vec<Document>> {
        self.gateway.enter(format!("aggregate:{}", self.name)).await?;
        let mut state = self.gateway.state.lock().unwrap();
        state.pipelines.push(pipeline.clone());
        let docs = state.collections.get(&self.name).cloned().unwrap_or_default();
        let filter = pipeline
            .iter()
            .find_map(|stage| stage.get_document("$match").ok().cloned())
            .unwrap_or_default();
        Ok(docs.into_iter().filter(|d| matches(d, &filter)).collect())
    }

    async fn update(
        &self,
        filter: Document,
        update: Document,
        options: UpdateOptions,
    ) -> GatewayResult<UpdateOutcome> {
        self.gateway.enter(format!("update:{}", self.name)).await?;
        let mut state = self.gateway.state.lock().unwrap();
        state.filters.push(filter.clone());
        let set = update.get_document("$set").cloned().unwrap_or_default();
        let docs = state.collections.entry(self.name.clone()).or_default();

        let mut outcome = UpdateOutcome::default();
        for doc in docs.iter_mut().filter(|d| matches(d, &filter)) {
            outcome.matched_count += 1;
            let before = doc.clone();
            for (k, v) in &set {
                doc.insert(k.clone(), v.clone());
            }
            if *doc != before {
                outcome.modified_count += 1;
            }
            if !options.multi {
                break;
            }
        }

        if outcome.matched_count == 0 && options.upsert {
            let id = Bson::ObjectId(ObjectId::new());
            let mut doc = filter.clone();
            doc.insert("_id", id.clone());
            for (k, v) in set {
                doc.insert(k, v);
            }
            docs.push(doc);
            outcome.upserted_id = Some(id);
        }
        Ok(outcome)
    }

    async fn insert_many(
        &self,
        documents: Vec<Document>,
        ordered: bool,
    ) -> GatewayResult<InsertOutcome> {
        self.gateway.enter(format!("insert:{}", self.name)).await?;
        let mut state = self.gateway.state.lock().unwrap();
        let docs = state.collections.entry(self.name.clone()).or_default();

        let mut outcome = InsertOutcome::default();
        for (index, mut doc) in documents.into_iter().enumerate() {
            let id = doc
                .entry("_id".to_string())
                .or_insert_with(|| Bson::ObjectId(ObjectId::new()))
                .clone();
            if docs.iter().any(|d| d.get("_id") == Some(&id)) {
                outcome.write_errors.push(WriteFailure {
                    index,
                    code: 11000,
                    message: format!("E11000 duplicate key error dup key: {{ _id: {} }}", id),
                });
                if ordered {
                    break;
                }
                continue;
            }
            docs.push(doc);
            outcome.inserted_ids.insert(index, id);
        }
        Ok(outcome)
    }

    async fn create_indexes(
        &self,
        indexes: Vec<Document>,
        _options: CreateIndexesOptions,
    ) -> GatewayResult<CreateIndexesOutcome> {
        self.gateway.enter(format!("createIndexes:{}", self.name)).await?;
        let mut state = self.gateway.state.lock().unwrap();
        let count = state.indexes.entry(self.name.clone()).or_insert(1);
        let before = *count;
        *count += indexes.len() as u64;
        Ok(CreateIndexesOutcome {
            created_indexes: indexes
                .iter()
                .filter_map(|i| i.get_str("name").ok().map(str::to_string))
                .collect(),
            num_indexes_before: before,
            num_indexes_after: *count,
        })
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn session_with(gateway: &MemoryGateway, read_only: bool) -> McpSession {
    McpSession::new(
        Arc::new(gateway.clone()),
        ServerConfig {
            read_only,
            object_id_mode: NormalizationMode::Auto,
        },
    )
}

fn to_map(args: JsonValue) -> Map<String, JsonValue> {
    match args {
        JsonValue::Object(m) => m,
        _ => Map::new(),
    }
}

/// Helper to execute an operation.
async fn call(session: &McpSession, name: &str, args: JsonValue) -> Result<JsonValue, McpError> {
    ToolRegistry::new()
        .execute(session, name, to_map(args), &CancellationToken::new())
        .await
}

async fn call_ok(session: &McpSession, name: &str, args: JsonValue) -> JsonValue {
    call(session, name, args)
        .await
        .unwrap_or_else(|e| panic!("Operation {} failed: {}", name, e))
}

async fn call_err(session: &McpSession, name: &str, args: JsonValue) -> McpError {
    match call(session, name, args).await {
        Ok(v) => panic!("Expected operation {} to fail, got {}", name, v),
        Err(e) => e,
    }
}

fn numbered(n: i32) -> Vec<Document> {
    (0..n).map(|i| doc! { "n": i, "kind": "item" }).collect()
}

// =============================================================================
// Router and policy
// =============================================================================

#[tokio::test]
async fn test_unknown_operation_touches_nothing() {
    let gateway = MemoryGateway::default();
    let session = session_with(&gateway, false);

    let err = call_err(&session, "dropDatabase", json!({"collection": "users"})).await;
    assert_eq!(err.kind(), ErrorKind::UnknownOperation);
    assert!(gateway.calls().is_empty());
}

#[tokio::test]
async fn test_system_collection_forbidden() {
    let gateway = MemoryGateway::default();
    let session = session_with(&gateway, false);

    let err = call_err(&session, "query", json!({"collection": "system.profile"})).await;
    assert_eq!(err.kind(), ErrorKind::ForbiddenCollection);
    assert!(err.to_string().contains("system.profile"));

    let err = call_err(&session, "count", json!({"collection": ""})).await;
    assert_eq!(err.kind(), ErrorKind::ForbiddenCollection);
    assert!(gateway.calls().is_empty());
}

#[tokio::test]
async fn test_missing_collection() {
    let gateway = MemoryGateway::default();
    let session = session_with(&gateway, false);

    for op in ["query", "aggregate", "count", "insert", "update", "createIndex"] {
        let err = call_err(&session, op, json!({"filter": {}})).await;
        assert_eq!(err.kind(), ErrorKind::MissingCollection, "{}", op);
    }
    let err = call_err(&session, "query", json!({"collection": 42})).await;
    assert_eq!(err.kind(), ErrorKind::MissingCollection);
}

#[tokio::test]
async fn test_read_only_rejects_writes_before_parsing() {
    let gateway = MemoryGateway::default();
    let session = session_with(&gateway, true);

    // Filter is garbage; the read-only check must win.
    let err = call_err(
        &session,
        "update",
        json!({"collection": "c", "filter": [1, 2], "update": "nope"}),
    )
    .await;
    assert_eq!(err.kind(), ErrorKind::ReadOnlyViolation);

    let err = call_err(&session, "insert", json!({"collection": "c", "documents": [{}]})).await;
    assert_eq!(err.kind(), ErrorKind::ReadOnlyViolation);

    let err = call_err(&session, "createIndex", json!({"collection": "system.x"})).await;
    assert_eq!(err.kind(), ErrorKind::ReadOnlyViolation);

    assert!(gateway.calls().is_empty());
}

#[tokio::test]
async fn test_read_only_allows_reads() {
    let gateway = MemoryGateway::default();
    gateway.seed("c", numbered(3));
    let session = session_with(&gateway, true);

    let result = call_ok(&session, "query", json!({"collection": "c"})).await;
    assert_eq!(result["metadata"]["total"], 3);
    let result = call_ok(&session, "count", json!({"collection": "c"})).await;
    assert_eq!(result["count"], 3);
}

#[tokio::test]
async fn test_gateway_failure_names_operation_and_collection() {
    let gateway = MemoryGateway::with_behavior(Behavior::Fail);
    let session = session_with(&gateway, false);

    let err = call_err(&session, "count", json!({"collection": "orders"})).await;
    assert_eq!(err.kind(), ErrorKind::GatewayFailure);
    let msg = err.to_string();
    assert!(msg.contains("count"), "{}", msg);
    assert!(msg.contains("orders"), "{}", msg);
    assert!(msg.contains("connection refused"), "{}", msg);

    let err = call_err(&session, "serverInfo", json!({})).await;
    assert_eq!(err.kind(), ErrorKind::GatewayFailure);
}

#[tokio::test]
async fn test_cancelled_before_call() {
    let gateway = MemoryGateway::default();
    let session = session_with(&gateway, false);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = ToolRegistry::new()
        .execute(&session, "count", to_map(json!({"collection": "c"})), &cancel)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);
}

#[tokio::test]
async fn test_cancel_aborts_pending_call() {
    let gateway = MemoryGateway::with_behavior(Behavior::Hang);
    let session = session_with(&gateway, false);
    let registry = ToolRegistry::new();
    let cancel = CancellationToken::new();

    let (result, _) = tokio::join!(
        registry.execute(&session, "query", to_map(json!({"collection": "c"})), &cancel),
        async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel.cancel();
        }
    );
    let err = result.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);
    let msg = err.to_string();
    assert!(msg.contains("query"), "{}", msg);
    assert!(msg.contains("'c'"), "{}", msg);
}

#[tokio::test]
async fn test_invalid_object_id_mode() {
    let gateway = MemoryGateway::default();
    let session = session_with(&gateway, false);

    let err = call_err(
        &session,
        "query",
        json!({"collection": "c", "objectIdMode": "always"}),
    )
    .await;
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

// =============================================================================
// query
// =============================================================================

#[tokio::test]
async fn test_query_last_page_metadata() {
    let gateway = MemoryGateway::default();
    gateway.seed("c", numbered(12));
    let session = session_with(&gateway, false);

    let result = call_ok(&session, "query", json!({"collection": "c", "limit": 5, "skip": 10})).await;
    let meta = &result["metadata"];
    assert_eq!(meta["total"], 12);
    assert_eq!(meta["returned"], 2);
    assert_eq!(meta["skip"], 10);
    assert_eq!(meta["limit"], 5);
    assert_eq!(meta["hasMore"], false);
    assert_eq!(result["results"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_query_defaults() {
    let gateway = MemoryGateway::default();
    gateway.seed("c", numbered(12));
    let session = session_with(&gateway, false);

    let result = call_ok(&session, "query", json!({"collection": "c"})).await;
    let meta = &result["metadata"];
    assert_eq!(meta["limit"], 10);
    assert_eq!(meta["skip"], 0);
    assert_eq!(meta["returned"], 10);
    assert_eq!(meta["hasMore"], true);

    // Count and find are both issued.
    let calls = gateway.calls();
    assert!(calls.contains(&"count:c".to_string()));
    assert!(calls.contains(&"find:c".to_string()));
}

#[tokio::test]
async fn test_query_issues_count_and_find_together() {
    let gateway = MemoryGateway::with_behavior(Behavior::HangOn("count:"));
    gateway.seed("c", numbered(3));
    let session = session_with(&gateway, false);
    let registry = ToolRegistry::new();
    let cancel = CancellationToken::new();

    // Count never answers; find must still have been sent.
    let (result, find_seen) = tokio::join!(
        registry.execute(&session, "query", to_map(json!({"collection": "c"})), &cancel),
        async {
            let mut seen = false;
            for _ in 0..50 {
                if gateway.calls().contains(&"find:c".to_string()) {
                    seen = true;
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            cancel.cancel();
            seen
        }
    );
    assert!(find_seen, "find was not issued while count was pending");
    assert!(gateway.calls().contains(&"count:c".to_string()));
    assert_eq!(result.unwrap_err().kind(), ErrorKind::Cancelled);
}

#[tokio::test]
async fn test_query_explain_clamps_huge_limit() {
    let gateway = MemoryGateway::default();
    let session = session_with(&gateway, false);

    let result = call_ok(
        &session,
        "query",
        json!({"collection": "c", "limit": u64::MAX, "skip": u64::MAX, "explain": true}),
    )
    .await;
    assert_eq!(result["command"]["limit"], i64::MAX);
    assert_eq!(result["command"]["skip"], i64::MAX);
}

#[tokio::test]
async fn test_query_numeric_strings_coerced() {
    let gateway = MemoryGateway::default();
    gateway.seed("c", numbered(4));
    let session = session_with(&gateway, false);

    let result = call_ok(&session, "query", json!({"collection": "c", "limit": "3"})).await;
    assert_eq!(result["metadata"]["returned"], 3);

    let err = call_err(&session, "query", json!({"collection": "c", "limit": -1})).await;
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[tokio::test]
async fn test_query_normalizes_id_filter() {
    let gateway = MemoryGateway::default();
    let oid = ObjectId::parse_str(OID).unwrap();
    gateway.seed("c", vec![doc! { "_id": oid, "name": OID }]);
    let session = session_with(&gateway, false);

    let result = call_ok(&session, "query", json!({"collection": "c", "filter": {"_id": OID}})).await;
    assert_eq!(result["metadata"]["returned"], 1);
    assert_eq!(result["results"][0]["_id"], json!({"$oid": OID}));
    assert_eq!(gateway.last_filter().get("_id"), Some(&Bson::ObjectId(oid)));

    // A non-id field stays a string in auto mode and matches the stored string.
    let result = call_ok(&session, "query", json!({"collection": "c", "filter": {"name": OID}})).await;
    assert_eq!(result["metadata"]["returned"], 1);

    // Forcing conversion turns it into an ObjectId, which no longer matches.
    let result = call_ok(
        &session,
        "query",
        json!({"collection": "c", "filter": {"name": OID}, "objectIdMode": "force"}),
    )
    .await;
    assert_eq!(result["metadata"]["returned"], 0);

    // With conversion disabled the _id string no longer matches the ObjectId.
    let result = call_ok(
        &session,
        "query",
        json!({"collection": "c", "filter": {"_id": OID}, "objectIdMode": "none"}),
    )
    .await;
    assert_eq!(result["metadata"]["returned"], 0);
}

#[tokio::test]
async fn test_query_filter_as_json_string() {
    let gateway = MemoryGateway::default();
    gateway.seed("c", numbered(3));
    let session = session_with(&gateway, false);

    let result = call_ok(&session, "query", json!({"collection": "c", "filter": "{\"n\": 1}"})).await;
    assert_eq!(result["metadata"]["total"], 1);

    let err = call_err(&session, "query", json!({"collection": "c", "filter": "{broken"})).await;
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    let err = call_err(&session, "query", json!({"collection": "c", "filter": [{"n": 1}]})).await;
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[tokio::test]
async fn test_query_invalid_sort() {
    let gateway = MemoryGateway::default();
    let session = session_with(&gateway, false);

    let err = call_err(&session, "query", json!({"collection": "c", "sort": {"n": 0}})).await;
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert!(gateway.calls().iter().all(|c| c.starts_with("collection:")));
}

#[tokio::test]
async fn test_query_explain_skips_metadata() {
    let gateway = MemoryGateway::default();
    gateway.seed("c", numbered(3));
    let session = session_with(&gateway, false);

    let result = call_ok(
        &session,
        "query",
        json!({"collection": "c", "filter": {"n": 1}, "explain": "executionStats"}),
    )
    .await;
    assert!(result.get("metadata").is_none());
    assert_eq!(result["queryPlanner"]["winningPlan"]["stage"], "COLLSCAN");
    assert_eq!(result["verbosity"], "executionStats");
    assert_eq!(result["command"]["find"], "c");

    let calls = gateway.calls();
    assert!(!calls.iter().any(|c| c.starts_with("find:") || c.starts_with("count:")));
}

// =============================================================================
// aggregate
// =============================================================================

#[tokio::test]
async fn test_aggregate_normalizes_stages() {
    let gateway = MemoryGateway::default();
    let oid = ObjectId::parse_str(OID).unwrap();
    gateway.seed("c", vec![doc! { "_id": oid }, doc! { "_id": ObjectId::new() }]);
    let session = session_with(&gateway, false);

    let result = call_ok(
        &session,
        "aggregate",
        json!({"collection": "c", "pipeline": [{"$match": {"_id": OID}}, {"$limit": 5}]}),
    )
    .await;
    assert_eq!(result["metadata"]["returned"], 1);

    let pipelines = gateway.state.lock().unwrap().pipelines.clone();
    let stage = &pipelines[0][0];
    assert_eq!(
        stage.get_document("$match").unwrap().get("_id"),
        Some(&Bson::ObjectId(oid))
    );
    assert_eq!(pipelines[0][1].get("$limit"), Some(&Bson::Int32(5)));
}

#[tokio::test]
async fn test_aggregate_pipeline_must_be_array() {
    let gateway = MemoryGateway::default();
    let session = session_with(&gateway, false);

    let err = call_err(&session, "aggregate", json!({"collection": "c", "pipeline": {"$match": {}}})).await;
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    let err = call_err(&session, "aggregate", json!({"collection": "c"})).await;
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    let err = call_err(&session, "aggregate", json!({"collection": "c", "pipeline": [1]})).await;
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[tokio::test]
async fn test_aggregate_explain() {
    let gateway = MemoryGateway::default();
    let session = session_with(&gateway, false);

    let result = call_ok(
        &session,
        "aggregate",
        json!({"collection": "c", "pipeline": [{"$match": {}}], "explain": true}),
    )
    .await;
    assert_eq!(result["verbosity"], "queryPlanner");
    assert_eq!(result["command"]["aggregate"], "c");
    assert!(!gateway.calls().contains(&"aggregate:c".to_string()));
}

// =============================================================================
// update
// =============================================================================

#[tokio::test]
async fn test_update_requires_operator() {
    let gateway = MemoryGateway::default();
    let session = session_with(&gateway, false);

    let err = call_err(
        &session,
        "update",
        json!({"collection": "c", "filter": {}, "update": {"foo": "bar"}}),
    )
    .await;
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert!(err.to_string().contains("operator"));

    let err = call_err(
        &session,
        "update",
        json!({"collection": "c", "filter": {}, "update": [{"$set": {"a": 1}}]}),
    )
    .await;
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    let err = call_err(&session, "update", json!({"collection": "c", "update": {"$set": {"a": 1}}})).await;
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    assert!(!gateway.calls().iter().any(|c| c.starts_with("update:")));
}

#[tokio::test]
async fn test_update_single_and_multi() {
    let gateway = MemoryGateway::default();
    gateway.seed("c", numbered(3));
    let session = session_with(&gateway, false);

    let result = call_ok(
        &session,
        "update",
        json!({"collection": "c", "filter": {"kind": "item"}, "update": {"$set": {"seen": true}}}),
    )
    .await;
    assert_eq!(result["matchedCount"], 1);
    assert_eq!(result["modifiedCount"], 1);
    assert_eq!(result["upsertedCount"], 0);
    assert_eq!(result["upsertedId"], JsonValue::Null);

    let result = call_ok(
        &session,
        "update",
        json!({"collection": "c", "filter": {"kind": "item"}, "update": {"$set": {"seen": true}}, "multi": true}),
    )
    .await;
    assert_eq!(result["matchedCount"], 3);
    assert_eq!(result["modifiedCount"], 2);
}

#[tokio::test]
async fn test_update_upsert() {
    let gateway = MemoryGateway::default();
    let session = session_with(&gateway, false);

    let result = call_ok(
        &session,
        "update",
        json!({"collection": "c", "filter": {"sku": "A1"}, "update": {"$set": {"qty": 5}}, "upsert": true}),
    )
    .await;
    assert_eq!(result["matchedCount"], 0);
    assert_eq!(result["upsertedCount"], 1);
    assert!(result["upsertedId"]["$oid"].is_string());
    assert_eq!(gateway.documents("c").len(), 1);
}

#[tokio::test]
async fn test_update_normalizes_dates_in_update() {
    let gateway = MemoryGateway::default();
    gateway.seed("c", vec![doc! { "n": 1 }]);
    let session = session_with(&gateway, false);

    call_ok(
        &session,
        "update",
        json!({"collection": "c", "filter": {"n": 1}, "update": {"$set": {"at": "ISODate(\"2023-01-01T00:00:00Z\")"}}}),
    )
    .await;
    let stored = &gateway.documents("c")[0];
    assert_eq!(
        stored.get("at"),
        Some(&Bson::DateTime(bson::DateTime::from_millis(1_672_531_200_000)))
    );
}

// =============================================================================
// insert
// =============================================================================

#[tokio::test]
async fn test_insert_empty_documents() {
    let gateway = MemoryGateway::default();
    let session = session_with(&gateway, false);

    let err = call_err(&session, "insert", json!({"collection": "c", "documents": []})).await;
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    let msg = err.to_string();
    assert!(msg.contains("Documents array cannot be empty"), "{}", msg);
    assert!(msg.contains("insert"), "{}", msg);
    assert!(msg.contains("'c'"), "{}", msg);
}

#[tokio::test]
async fn test_insert_rejects_non_objects() {
    let gateway = MemoryGateway::default();
    let session = session_with(&gateway, false);

    let err = call_err(&session, "insert", json!({"collection": "c", "documents": [{"a": 1}, 2]})).await;
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert!(err.to_string().contains("index 1"));

    let err = call_err(&session, "insert", json!({"collection": "c", "documents": {"a": 1}})).await;
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert!(gateway.documents("c").is_empty());
}

#[tokio::test]
async fn test_insert_normalizes_each_document() {
    let gateway = MemoryGateway::default();
    let session = session_with(&gateway, false);

    let result = call_ok(
        &session,
        "insert",
        json!({"collection": "c", "documents": [
            {"_id": OID, "ownerId": OID, "label": OID, "createdAt": "2023-01-01T00:00:00Z"},
            {"n": 2}
        ]}),
    )
    .await;
    assert_eq!(result["acknowledged"], true);
    assert_eq!(result["insertedCount"], 2);
    assert_eq!(result["insertedIds"]["0"], json!({"$oid": OID}));

    let stored = gateway.documents("c");
    let oid = Bson::ObjectId(ObjectId::parse_str(OID).unwrap());
    assert_eq!(stored[0].get("_id"), Some(&oid));
    assert_eq!(stored[0].get("ownerId"), Some(&oid));
    assert_eq!(stored[0].get("label"), Some(&Bson::String(OID.to_string())));
    assert!(matches!(stored[0].get("createdAt"), Some(Bson::DateTime(_))));
}

// Partial bulk failure is a successful payload, unlike every other failure.
#[tokio::test]
async fn test_insert_partial_failure_is_reported_not_raised() {
    let gateway = MemoryGateway::default();
    let oid = ObjectId::parse_str(OID).unwrap();
    gateway.seed("c", vec![doc! { "_id": oid }]);
    let session = session_with(&gateway, false);

    let result = call_ok(
        &session,
        "insert",
        json!({"collection": "c", "ordered": false, "documents": [{"n": 1}, {"_id": OID}, {"n": 3}]}),
    )
    .await;
    assert!(result["error"].is_string());
    assert_eq!(result["insertedCount"], 2);
    assert_eq!(result["failedCount"], 1);
    let errors = result["writeErrors"].as_array().unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["index"], 1);
    assert_eq!(errors[0]["code"], 11000);
    assert_eq!(gateway.documents("c").len(), 3);
}

#[tokio::test]
async fn test_insert_ordered_stops_at_first_failure() {
    let gateway = MemoryGateway::default();
    let oid = ObjectId::parse_str(OID).unwrap();
    gateway.seed("c", vec![doc! { "_id": oid }]);
    let session = session_with(&gateway, false);

    let result = call_ok(
        &session,
        "insert",
        json!({"collection": "c", "documents": [{"n": 1}, {"_id": OID}, {"n": 3}]}),
    )
    .await;
    assert_eq!(result["insertedCount"], 1);
    assert_eq!(result["failedCount"], 2);
    assert_eq!(gateway.documents("c").len(), 2);
}

// =============================================================================
// createIndex
// =============================================================================

#[tokio::test]
async fn test_create_index() {
    let gateway = MemoryGateway::default();
    let session = session_with(&gateway, false);

    let result = call_ok(
        &session,
        "createIndex",
        json!({
            "collection": "c",
            "indexes": [{"key": {"email": 1}, "unique": true}, {"key": {"a": 1, "b": -1}, "name": "ab"}],
            "writeConcern": {"w": "majority"},
            "commitQuorum": "votingMembers"
        }),
    )
    .await;
    assert_eq!(result["acknowledged"], true);
    assert_eq!(result["createdIndexes"], json!(["email_1", "ab"]));
    assert_eq!(result["numIndexesBefore"], 1);
    assert_eq!(result["numIndexesAfter"], 3);
}

#[tokio::test]
async fn test_create_index_validation() {
    let gateway = MemoryGateway::default();
    let session = session_with(&gateway, false);

    for args in [
        json!({"collection": "c", "indexes": []}),
        json!({"collection": "c", "indexes": {"key": {"a": 1}}}),
        json!({"collection": "c", "indexes": [{"key": {"a": 1}}], "commitQuorum": true}),
        json!({"collection": "c", "indexes": [{"key": {"a": 1}}], "writeConcern": {"w": true}}),
        json!({"collection": "c", "indexes": [{"name": "no_key"}]}),
    ] {
        let err = call_err(&session, "createIndex", args.clone()).await;
        assert_eq!(err.kind(), ErrorKind::InvalidArgument, "{}", args);
    }
    assert!(!gateway.calls().iter().any(|c| c.starts_with("createIndexes:")));
}

// =============================================================================
// count
// =============================================================================

#[tokio::test]
async fn test_count() {
    let gateway = MemoryGateway::default();
    gateway.seed("c", numbered(5));
    let session = session_with(&gateway, false);

    let result = call_ok(&session, "count", json!({"collection": "c"})).await;
    assert_eq!(result, json!({"count": 5, "ok": 1}));

    let result = call_ok(&session, "count", json!({"collection": "c", "query": {"n": 2}})).await;
    assert_eq!(result["count"], 1);

    let result = call_ok(
        &session,
        "count",
        json!({"collection": "c", "skip": 1, "limit": 2, "maxTimeMS": 1000, "hint": "n_1"}),
    )
    .await;
    assert_eq!(result["count"], 2);

    let err = call_err(&session, "count", json!({"collection": "c", "hint": 5})).await;
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

// =============================================================================
// listCollections
// =============================================================================

#[tokio::test]
async fn test_list_collections_paging() {
    let gateway = MemoryGateway::default();
    gateway.seed("a", vec![]);
    gateway.seed("b", vec![]);
    gateway.seed("c", vec![]);
    let session = session_with(&gateway, false);

    let result = call_ok(&session, "listCollections", json!({"skip": 0, "limit": 1})).await;
    assert_eq!(result["results"].as_array().unwrap().len(), 1);
    assert_eq!(result["metadata"]["total"], 3);
    assert_eq!(result["metadata"]["hasMore"], true);

    let result = call_ok(&session, "listCollections", json!({"skip": 2})).await;
    assert_eq!(result["results"][0]["name"], "c");
    assert_eq!(result["metadata"]["limit"], 20);
    assert_eq!(result["metadata"]["hasMore"], false);
}

#[tokio::test]
async fn test_list_collections_filter_and_name_only() {
    let gateway = MemoryGateway::default();
    gateway.seed("users", vec![]);
    gateway.seed("orders", vec![]);
    let session = session_with(&gateway, false);

    let result = call_ok(
        &session,
        "listCollections",
        json!({"filter": {"name": "users"}, "nameOnly": true}),
    )
    .await;
    let results = result["results"].as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["name"], "users");
    assert!(results[0].get("options").is_none());
}

// =============================================================================
// serverInfo
// =============================================================================

#[tokio::test]
async fn test_server_info_basic() {
    let gateway = MemoryGateway::default();
    let session = session_with(&gateway, false);

    let result = call_ok(&session, "serverInfo", json!({})).await;
    assert_eq!(result["version"], "7.0.4");
    assert_eq!(result["bits"], 64);
    assert!(result.get("openssl").is_none());
    assert!(result.get("debugInfo").is_none());
    assert_eq!(result["connectionInfo"]["readOnlyMode"], false);
    assert_eq!(result["connectionInfo"]["readPreference"], "primary");
    assert_eq!(gateway.calls(), vec!["command:buildInfo".to_string()]);
}

#[tokio::test]
async fn test_server_info_debug_read_only() {
    let gateway = MemoryGateway::default();
    let session = session_with(&gateway, true);

    let result = call_ok(&session, "serverInfo", json!({"includeDebugInfo": true})).await;
    assert_eq!(result["debugInfo"]["uptime"], 42.0);
    assert_eq!(result["debugInfo"]["connections"]["current"], 3);
    assert!(result["debugInfo"].get("asserts").is_none());
    assert_eq!(result["connectionInfo"]["readOnlyMode"], true);
    assert_eq!(result["connectionInfo"]["readPreference"], "secondary");
    assert!(gateway.calls().contains(&"command:serverStatus".to_string()));
}

// =============================================================================
// Stdio server
// =============================================================================

#[tokio::test]
async fn test_server_round_trip() {
    let gateway = MemoryGateway::default();
    gateway.seed("c", numbered(2));
    let mut server = McpServer::new(session_with(&gateway, false));

    let input = [
        json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}),
        json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
        json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}),
        json!({"jsonrpc": "2.0", "id": 3, "method": "tools/call",
               "params": {"name": "count", "arguments": {"collection": "c"}}}),
        json!({"jsonrpc": "2.0", "id": 4, "method": "tools/call",
               "params": {"name": "drop", "arguments": {}}}),
    ]
    .iter()
    .map(|v| v.to_string())
    .collect::<Vec<_>>()
    .join("\n");

    let mut output = Vec::new();
    server.serve(input.as_bytes(), &mut output).await.unwrap();
    assert!(server.is_initialized());

    let responses: Vec<JsonValue> = String::from_utf8(output)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    // The notification gets no reply.
    assert_eq!(responses.len(), 4);

    assert_eq!(responses[0]["result"]["serverInfo"]["name"], "mongo-mcp");
    assert_eq!(responses[1]["result"]["tools"].as_array().unwrap().len(), 8);

    let content = &responses[2]["result"]["content"][0];
    assert_eq!(content["type"], "text");
    let payload: JsonValue = serde_json::from_str(content["text"].as_str().unwrap()).unwrap();
    assert_eq!(payload["count"], 2);

    assert_eq!(responses[3]["error"]["code"], -32601);
}
