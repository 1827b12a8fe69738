//! Error types for overlay agent operations.
//!
//! Errors fall into four groups: external tool failures (switch CLI),
//! domain sentinels that callers match on (not-found, already-exists),
//! persistence failures, and topology transport failures. All errors
//! implement `std::error::Error` via `thiserror`.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for overlay operations.
pub type OverlayResult<T> = Result<T, OverlayError>;

/// Errors that can occur during overlay operations.
#[derive(Debug, Error)]
pub enum OverlayError {
    /// Failed to execute a shell command (spawn error).
    #[error("Failed to execute shell command '{command}': {source}")]
    ShellExec {
        /// The command that failed to execute.
        command: String,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },

    /// Shell command returned non-zero exit code.
    #[error("Shell command failed: '{command}' (exit code {exit_code}): {output}")]
    ShellCommandFailed {
        /// The command that failed.
        command: String,
        /// The exit code.
        exit_code: i32,
        /// Combined stdout/stderr output.
        output: String,
    },

    /// Table entry not found.
    #[error("Table entry not found: {table}:{key}")]
    NotFound {
        /// The table name.
        table: String,
        /// The key.
        key: String,
    },

    /// A live tenant network already uses one of the identifiers.
    #[error("Network exists: {network_id} (vni {vni}, vlan {vlan_id})")]
    NetworkExists {
        /// The network being added.
        network_id: String,
        /// Its tunnel key.
        vni: u32,
        /// Its local VLAN tag.
        vlan_id: u16,
    },

    /// The network is not active in the overlay manager.
    #[error("Network not found: {network_id}")]
    NetworkNotFound {
        /// The network identifier.
        network_id: String,
    },

    /// An ID allocator ran out of space.
    #[error("No free id left in {space} (limit {limit})")]
    IdExhausted {
        /// Allocator name (e.g. "vlan", "tunnel-ofport").
        space: String,
        /// Exclusive upper bound.
        limit: u32,
    },

    /// Reading or writing a persisted table failed.
    #[error("Persistence failed for {}: {message}", path.display())]
    Persistence {
        /// The table file.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// Manager sync request failed.
    #[error("Topology sync failed: {url}: {message}")]
    Http {
        /// The requested URL.
        url: String,
        /// Error message.
        message: String,
    },

    /// Configuration validation error.
    #[error("Invalid configuration for {field}: {message}")]
    InvalidConfig {
        /// The field that failed validation.
        field: String,
        /// Error message.
        message: String,
    },

    /// Internal error (unexpected state).
    #[error("Internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
    },
}

impl OverlayError {
    /// Creates a table entry not found error.
    pub fn not_found(table: impl Into<String>, key: impl Into<String>) -> Self {
        Self::NotFound {
            table: table.into(),
            key: key.into(),
        }
    }

    /// Creates a network not found error.
    pub fn network_not_found(network_id: impl Into<String>) -> Self {
        Self::NetworkNotFound {
            network_id: network_id.into(),
        }
    }

    /// Creates a persistence error.
    pub fn persistence(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Persistence {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates an HTTP / transport error.
    pub fn http(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Http {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid configuration error.
    pub fn invalid_config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this error indicates a transient condition
    /// that may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            OverlayError::ShellCommandFailed { .. }
                | OverlayError::ShellExec { .. }
                | OverlayError::Http { .. }
        )
    }

    /// Returns true for the benign "already gone" sentinels.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            OverlayError::NotFound { .. } | OverlayError::NetworkNotFound { .. }
        )
    }
}
