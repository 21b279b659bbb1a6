//! Operation whitelist, read-only enforcement and collection safety.
//!
//! All checks here run before any data store call.

use std::fmt;
use std::str::FromStr;

use crate::error::{McpError, Result};

/// Collections in this namespace are never exposed.
pub const SYSTEM_PREFIX: &str = "system.";

/// The eight operations the server exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Find documents with metadata.
    Query,
    /// Run an aggregation pipeline.
    Aggregate,
    /// Update one or many documents.
    Update,
    /// Build and runtime information.
    ServerInfo,
    /// Insert a batch of documents.
    Insert,
    /// Create indexes.
    CreateIndex,
    /// Count matching documents.
    Count,
    /// List collections in the database.
    ListCollections,
}

impl Operation {
    /// Every operation, in advertised order.
    pub const ALL: [Operation; 8] = [
        Operation::Query,
        Operation::Aggregate,
        Operation::Update,
        Operation::ServerInfo,
        Operation::Insert,
        Operation::CreateIndex,
        Operation::Count,
        Operation::ListCollections,
    ];

    /// Wire name of the operation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Query => "query",
            Operation::Aggregate => "aggregate",
            Operation::Update => "update",
            Operation::ServerInfo => "serverInfo",
            Operation::Insert => "insert",
            Operation::CreateIndex => "createIndex",
            Operation::Count => "count",
            Operation::ListCollections => "listCollections",
        }
    }

    /// Whether the operation modifies data.
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            Operation::Update | Operation::Insert | Operation::CreateIndex
        )
    }

    /// Whether the operation targets a single collection.
    pub fn requires_collection(&self) -> bool {
        !matches!(self, Operation::ServerInfo | Operation::ListCollections)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = McpError;

    fn from_str(name: &str) -> Result<Self> {
        Operation::ALL
            .into_iter()
            .find(|op| op.as_str() == name)
            .ok_or_else(|| McpError::UnknownOperation(name.to_string()))
    }
}

/// Reject write operations when the server is read-only.
pub fn check_write_access(operation: Operation, read_only: bool) -> Result<()> {
    if read_only && operation.is_write() {
        return Err(McpError::ReadOnly { operation });
    }
    Ok(())
}

/// Reject empty collection names and the system namespace.
pub fn check_collection(operation: Operation, name: &str) -> Result<()> {
    if name.is_empty() || name.starts_with(SYSTEM_PREFIX) {
        return Err(McpError::ForbiddenCollection {
            operation,
            collection: name.to_string(),
        });
    }
    Ok(())
}
