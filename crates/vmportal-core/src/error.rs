// SPDX-FileCopyrightText: 2026 VmPortal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the VmPortal services.

use thiserror::Error;

/// The primary error type used across all VmPortal collaborator traits and core operations.
#[derive(Debug, Error)]
pub enum PortalError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A hypervisor API call failed (network, non-2xx status, malformed response).
    #[error("upstream error: {message}")]
    Upstream {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The hypervisor reported that the addressed resource does not exist.
    #[error("upstream resource not found: {resource}")]
    UpstreamNotFound { resource: String },

    /// A console session token is absent, expired, or already consumed.
    #[error("console session not found")]
    SessionNotFound,

    /// A console session exists but was presented by someone other than its owner.
    #[error("console session belongs to another user")]
    SessionForbidden,

    /// A read or write failed on one side of a console relay.
    #[error("relay transport error: {message}")]
    RelayTransport { message: String },

    /// Fetching the remote inventory failed; the reconciliation pass was aborted.
    #[error("inventory fetch failed: {source}")]
    InventoryFetch {
        #[source]
        source: Box<PortalError>,
    },

    /// Deleting one VM during tombstoning failed.
    #[error("failed to delete VM {node}/{vm_id}: {source}")]
    VmDelete {
        node: String,
        vm_id: u32,
        #[source]
        source: Box<PortalError>,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl PortalError {
    /// Shorthand for an upstream failure without an underlying source error.
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::Upstream {
            message: message.into(),
            source: None,
        }
    }

    /// Returns true when the hypervisor reported the resource as already gone.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::UpstreamNotFound { .. })
    }
}
