//! Data store gateway abstraction.
//!
//! The operation core talks to the database only through [`Gateway`] and
//! [`CollectionHandle`]. The MongoDB driver implementation lives in
//! [`mongo`]; tests plug in an in-memory one.

#[cfg(feature = "mongodb")]
pub mod mongo;

use std::collections::BTreeMap;

use async_trait::async_trait;
use bson::{Bson, Document};

/// Error reported by the data store.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct GatewayError(pub String);

impl GatewayError {
    /// Create an error from any message.
    pub fn new(message: impl Into<String>) -> Self {
        GatewayError(message.into())
    }
}

impl From<bson::ser::Error> for GatewayError {
    fn from(err: bson::ser::Error) -> Self {
        GatewayError(err.to_string())
    }
}

impl From<bson::de::Error> for GatewayError {
    fn from(err: bson::de::Error) -> Self {
        GatewayError(err.to_string())
    }
}

/// Result type for gateway calls.
pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

/// Options for [`CollectionHandle::find`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    /// Maximum number of documents; `0` means no limit.
    pub limit: u64,
    /// Number of documents to skip.
    pub skip: u64,
    /// Sort specification.
    pub sort: Option<Document>,
    /// Projection.
    pub projection: Option<Document>,
}

/// Options for [`CollectionHandle::count_documents`]. Absent values are not
/// sent to the server.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CountOptions {
    /// Count at most this many documents.
    pub limit: Option<u64>,
    /// Skip this many matching documents.
    pub skip: Option<u64>,
    /// Index name or key pattern.
    pub hint: Option<Bson>,
    /// Read concern document.
    pub read_concern: Option<Document>,
    /// Server-side time limit in milliseconds.
    pub max_time_ms: Option<u64>,
    /// Collation document.
    pub collation: Option<Document>,
}

/// Options for [`CollectionHandle::update`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Insert when nothing matches.
    pub upsert: bool,
    /// Update every match instead of the first.
    pub multi: bool,
}

/// Outcome of an update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateOutcome {
    /// Documents matched by the filter.
    pub matched_count: u64,
    /// Documents actually changed.
    pub modified_count: u64,
    /// Id of the upserted document, if any.
    pub upserted_id: Option<Bson>,
}

/// A single failed document within a bulk insert.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteFailure {
    /// Position of the document in the submitted batch.
    pub index: usize,
    /// Server error code.
    pub code: i32,
    /// Server error message.
    pub message: String,
}

/// Outcome of a bulk insert. Write errors are data, not a failed call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InsertOutcome {
    /// Ids of inserted documents, keyed by batch index.
    pub inserted_ids: BTreeMap<usize, Bson>,
    /// Per-document failures.
    pub write_errors: Vec<WriteFailure>,
}

/// Options for [`CollectionHandle::create_indexes`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CreateIndexesOptions {
    /// Write concern document.
    pub write_concern: Option<Document>,
    /// Commit quorum, a string or a number of voting members.
    pub commit_quorum: Option<Bson>,
}

/// Outcome of index creation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CreateIndexesOutcome {
    /// Names of the requested indexes.
    pub created_indexes: Vec<String>,
    /// Index count before the call.
    pub num_indexes_before: u64,
    /// Index count after the call.
    pub num_indexes_after: u64,
}

/// Database-level operations.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Get a handle on a named collection. Does not touch the server.
    fn collection(&self, name: &str) -> Box<dyn CollectionHandle>;

    /// Run a database command and return the reply.
    async fn command(&self, command: Document) -> GatewayResult<Document>;

    /// List collection metadata, or `{name, type}` pairs when `name_only`.
    async fn list_collections(
        &self,
        filter: Document,
        name_only: bool,
    ) -> GatewayResult<Vec<Document>>;
}

/// Collection-level operations.
#[async_trait]
pub trait CollectionHandle: Send + Sync {
    /// Collection name.
    fn name(&self) -> &str;

    /// Find documents.
    async fn find(&self, filter: Document, options: FindOptions) -> GatewayResult<Vec<Document>>;

    /// Count documents matching a filter.
    async fn count_documents(&self, filter: Document, options: CountOptions)
        -> GatewayResult<u64>;

    /// Run an aggregation pipeline.
    async fn aggregate(&self, pipeline: Vec<Document>) -> GatewayResult<Vec<Document>>;

    /// Update one document, or all matches when `options.multi` is set.
    async fn update(
        &self,
        filter: Document,
        update: Document,
        options: UpdateOptions,
    ) -> GatewayResult<UpdateOutcome>;

    /// Insert a batch of documents.
    async fn insert_many(&self, documents: Vec<Document>, ordered: bool)
        -> GatewayResult<InsertOutcome>;

    /// Create indexes from full index specifications (`key`, `name`, ...).
    async fn create_indexes(
        &self,
        indexes: Vec<Document>,
        options: CreateIndexesOptions,
    ) -> GatewayResult<CreateIndexesOutcome>;
}
