//! MCP session state.
//!
//! Holds the long-lived gateway handle together with the server-wide
//! configuration the operation core consults on every request.

use std::sync::Arc;

use crate::error::Result;
use crate::gateway::Gateway;
use crate::normalize::NormalizationMode;
use crate::policy::{self, Operation};

/// Server-wide settings supplied by the bootstrap layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerConfig {
    /// Reject update, insert and createIndex.
    pub read_only: bool,
    /// Default identifier normalization for requests that don't override it.
    pub object_id_mode: NormalizationMode,
}

/// MCP session state.
///
/// The gateway is constructed once by the caller and shared; the session
/// never closes it.
pub struct McpSession {
    gateway: Arc<dyn Gateway>,
    config: ServerConfig,
}

impl McpSession {
    /// Create a session over a gateway.
    pub fn new(gateway: Arc<dyn Gateway>, config: ServerConfig) -> Self {
        Self { gateway, config }
    }

    /// Returns `true` if the server runs in read-only mode.
    pub fn is_read_only(&self) -> bool {
        self.config.read_only
    }

    /// Default normalization mode.
    pub fn object_id_mode(&self) -> NormalizationMode {
        self.config.object_id_mode
    }

    /// Read preference implied by the access mode.
    pub fn read_preference(&self) -> &'static str {
        if self.config.read_only {
            "secondary"
        } else {
            "primary"
        }
    }

    /// Reject write operations when the server is read-only.
    pub fn check_write_access(&self, operation: Operation) -> Result<()> {
        policy::check_write_access(operation, self.config.read_only)
    }

    /// The data store gateway.
    pub fn gateway(&self) -> &dyn Gateway {
        self.gateway.as_ref()
    }
}
