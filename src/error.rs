//! Error types for the MCP server.
//!
//! Every failure the operation core can produce is a variant of [`McpError`];
//! the stdio server maps them onto JSON-RPC error codes.

use crate::policy::Operation;

/// MCP server errors.
#[derive(Debug, thiserror::Error)]
pub enum McpError {
    /// Operation name is not one of the eight supported operations.
    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    /// Write operation attempted while the server is read-only.
    #[error("{operation} rejected: server is running in read-only mode")]
    ReadOnly {
        /// The rejected operation
        operation: Operation,
    },

    /// Collection name is empty or lives in the reserved system namespace.
    #[error("{operation} rejected: access to collection '{collection}' is forbidden")]
    ForbiddenCollection {
        /// The rejected operation
        operation: Operation,
        /// The offending collection name
        collection: String,
    },

    /// Operation needs a `collection` argument and none was given.
    #[error("{operation} requires a 'collection' string argument")]
    MissingCollection {
        /// The operation missing its collection
        operation: Operation,
    },

    /// Missing required argument.
    #[error("missing required argument: {0}")]
    MissingArg(String),

    /// Invalid argument value.
    #[error("invalid argument '{name}': {reason}")]
    InvalidArg {
        /// Argument name
        name: String,
        /// Reason why it's invalid
        reason: String,
    },

    /// The data store rejected or failed a call.
    #[error("failed to {operation}{}: {message}", on_collection(.collection))]
    Gateway {
        /// Operation that issued the call
        operation: Operation,
        /// Target collection, when there is one
        collection: Option<String>,
        /// Message reported by the data store
        message: String,
    },

    /// The caller cancelled the request before the data store answered.
    #[error("{operation}{} cancelled", on_collection(.collection))]
    Cancelled {
        /// The cancelled operation
        operation: Operation,
        /// Target collection, when there is one
        collection: Option<String>,
    },

    /// Argument error annotated with the operation it belongs to.
    #[error("{operation}{} failed: {source}", on_collection(.collection))]
    Failed {
        /// The failed operation
        operation: Operation,
        /// Target collection, when there is one
        collection: Option<String>,
        /// Underlying error
        #[source]
        source: Box<McpError>,
    },

    /// JSON-RPC protocol error.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

fn on_collection(collection: &Option<String>) -> String {
    match collection {
        Some(name) => format!(" on collection '{}'", name),
        None => String::new(),
    }
}

/// Flat classification of [`McpError`], seen through context wrappers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Operation name not in the whitelist.
    UnknownOperation,
    /// Write attempted in read-only mode.
    ReadOnlyViolation,
    /// Empty or system collection.
    ForbiddenCollection,
    /// `collection` argument absent.
    MissingCollection,
    /// Malformed or missing argument.
    InvalidArgument,
    /// Data store failure.
    GatewayFailure,
    /// Request cancelled.
    Cancelled,
    /// Transport or internal failure outside the operation core.
    Internal,
}

impl McpError {
    /// Shorthand for [`McpError::InvalidArg`].
    pub fn invalid(name: &str, reason: impl Into<String>) -> Self {
        McpError::InvalidArg {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            McpError::UnknownOperation(_) => ErrorKind::UnknownOperation,
            McpError::ReadOnly { .. } => ErrorKind::ReadOnlyViolation,
            McpError::ForbiddenCollection { .. } => ErrorKind::ForbiddenCollection,
            McpError::MissingCollection { .. } => ErrorKind::MissingCollection,
            McpError::MissingArg(_) | McpError::InvalidArg { .. } => ErrorKind::InvalidArgument,
            McpError::Gateway { .. } => ErrorKind::GatewayFailure,
            McpError::Cancelled { .. } => ErrorKind::Cancelled,
            McpError::Failed { source, .. } => source.kind(),
            McpError::Protocol(_) | McpError::Io(_) | McpError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Convert to JSON-RPC error code.
    pub fn rpc_code(&self) -> i32 {
        match self.kind() {
            ErrorKind::UnknownOperation => rpc_codes::METHOD_NOT_FOUND,
            ErrorKind::ReadOnlyViolation
            | ErrorKind::ForbiddenCollection
            | ErrorKind::MissingCollection
            | ErrorKind::InvalidArgument => rpc_codes::INVALID_PARAMS,
            ErrorKind::GatewayFailure | ErrorKind::Cancelled | ErrorKind::Internal => {
                match self {
                    McpError::Protocol(_) => rpc_codes::INVALID_REQUEST,
                    _ => rpc_codes::INTERNAL_ERROR,
                }
            }
        }
    }
}

impl From<std::io::Error> for McpError {
    fn from(err: std::io::Error) -> Self {
        McpError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for McpError {
    fn from(err: serde_json::Error) -> Self {
        McpError::Protocol(format!("JSON error: {}", err))
    }
}

/// JSON-RPC error codes.
pub mod rpc_codes {
    /// Parse error - Invalid JSON was received.
    pub const PARSE_ERROR: i32 = -32700;
    /// Invalid Request - The JSON sent is not a valid Request object.
    pub const INVALID_REQUEST: i32 = -32600;
    /// Method not found - The method does not exist / is not available.
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Invalid params - Invalid method parameter(s).
    pub const INVALID_PARAMS: i32 = -32602;
    /// Internal error - Internal JSON-RPC error.
    pub const INTERNAL_ERROR: i32 = -32603;
}

/// Result type for MCP operations.
pub type Result<T> = std::result::Result<T, McpError>;
