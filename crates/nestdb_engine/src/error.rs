//! Error types for engine operations.

use std::io;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur in the storage engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// I/O error from the underlying storage.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The engine has been closed.
    #[error("engine is closed")]
    Closed,

    /// The engine store already exists and `error_if_exists` was set.
    #[error("engine store already exists: {path}")]
    AlreadyExists {
        /// Path of the existing store.
        path: String,
    },

    /// Optimistic concurrency violation detected at commit.
    #[error("transaction conflict: a tracked key was modified concurrently")]
    Conflict,

    /// A transaction handle was used after commit or rollback.
    #[error("transaction has already finished")]
    TransactionFinished,

    /// A snapshot handle was released twice or used after release.
    #[error("snapshot has already been released")]
    SnapshotReleased,

    /// A snapshot handle from a different engine instance was supplied.
    #[error("snapshot does not belong to this engine")]
    ForeignSnapshot,

    /// An iterator was used after being closed.
    #[error("iterator is closed")]
    IteratorClosed,

    /// The persistence log is corrupted.
    #[error("log corruption: {message}")]
    Corruption {
        /// Description of the corruption.
        message: String,
    },
}

impl EngineError {
    /// Creates a corruption error.
    pub fn corruption(message: impl Into<String>) -> Self {
        Self::Corruption {
            message: message.into(),
        }
    }

    /// Creates an already-exists error.
    pub fn already_exists(path: impl Into<String>) -> Self {
        Self::AlreadyExists { path: path.into() }
    }
}
