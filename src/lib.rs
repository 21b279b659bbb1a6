//! # mongo-mcp
//!
//! MCP (Model Context Protocol) server for MongoDB.
//!
//! This crate exposes a MongoDB database to AI agents as eight tools:
//! `query`, `aggregate`, `update`, `serverInfo`, `insert`, `createIndex`,
//! `count` and `listCollections`. It implements the MCP protocol over
//! stdin/stdout using JSON-RPC 2.0.
//!
//! ## Features
//!
//! - **Argument normalization**: 24-hex strings become `ObjectId`s and ISO
//!   timestamps become dates, controlled by the `auto`/`none`/`force` mode
//! - **Read-only mode**: update, insert and createIndex are rejected up front
//! - **System collections**: anything under `system.` is off limits
//! - **Cancellation**: every database call aborts when the caller's
//!   [`CancellationToken`](tokio_util::sync::CancellationToken) fires
//!
//! ## Usage
//!
//! The server is typically run as an executable and configured in AI tools like Claude Desktop:
//!
//! ```json
//! {
//!   "mcpServers": {
//!     "mongodb": {
//!       "command": "/path/to/mongo-mcp",
//!       "args": ["mongodb://localhost:27017/mydb", "--read-only"]
//!     }
//!   }
//! }
//! ```
//!
//! ## Library Usage
//!
//! The operation core only needs a [`Gateway`]; any implementation works:
//!
//! ```no_run
//! # #[cfg(feature = "mongodb")]
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! use std::sync::Arc;
//! use mongo_mcp::{McpSession, MongoGateway, ServerConfig, ToolRegistry};
//! use tokio_util::sync::CancellationToken;
//!
//! let gateway = Arc::new(MongoGateway::connect("mongodb://localhost/test", None, false).await?);
//! let session = McpSession::new(gateway, ServerConfig::default());
//! let registry = ToolRegistry::new();
//!
//! let args = serde_json::json!({"collection": "users", "limit": 5});
//! let result = registry
//!     .execute(&session, "query", args.as_object().cloned().unwrap_or_default(), &CancellationToken::new())
//!     .await?;
//! println!("{}", result["metadata"]);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

mod convert;
mod error;
pub mod gateway;
mod normalize;
mod policy;
mod server;
mod session;
pub mod tools;

pub use convert::{bson_to_json, document_to_json, json_to_bson};
pub use error::{ErrorKind, McpError, Result};
#[cfg(feature = "mongodb")]
pub use gateway::mongo::MongoGateway;
pub use gateway::{CollectionHandle, Gateway, GatewayError, GatewayResult};
pub use normalize::{normalize, normalize_string, parse_filter, parse_sort, NormalizationMode};
pub use policy::{Operation, SYSTEM_PREFIX};
pub use server::{JsonRpcRequest, JsonRpcResponse, McpServer};
pub use session::{McpSession, ServerConfig};
pub use tools::{envelope, OperationRequest, ToolDef, ToolRegistry};
