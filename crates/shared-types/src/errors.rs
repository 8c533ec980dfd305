//! # Error Types
//!
//! Errors shared between the consensus core and its storage adapters.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Key-value store errors.
#[derive(Debug, Clone, Error)]
pub enum KVStoreError {
    /// I/O error during read/write.
    #[error("KV store I/O error: {message}")]
    IOError { message: String },

    /// Data corruption in the store.
    #[error("KV store corruption: {message}")]
    CorruptionError { message: String },

    /// Store is not reachable (closed or failing writes).
    #[error("KV store unavailable: {message}")]
    Unavailable { message: String },

    /// Another process holds the store's lock file.
    #[error("KV store already in use ({path})")]
    Locked { path: String },
}

/// Node operational states reported to the status collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeHealth {
    /// Normal operation.
    Healthy,
    /// A layer halted to protect safety; the reason is human readable.
    Degraded { reason: String },
    /// Shutdown requested or completed.
    Stopped,
}
