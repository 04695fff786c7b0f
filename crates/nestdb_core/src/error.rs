//! Error types for NestDB core.

use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in NestDB core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The database is running and the operation requires it stopped.
    #[error("database is running")]
    Running,

    /// The database is not running.
    #[error("database is not running")]
    NotRunning,

    /// The database has been destroyed.
    #[error("database is destroyed")]
    Destroyed,

    /// The database directory could not be created.
    #[error("could not create database directory {path}")]
    Create {
        /// Directory that failed to create.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The database directory could not be deleted.
    #[error("could not delete database directory {path}")]
    Delete {
        /// Directory that failed to delete.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Canary validation failed at open.
    #[error("{message}")]
    Key {
        /// Why the key was rejected.
        message: String,
    },

    /// The AEAD rejected a ciphertext.
    #[error("decryption failed: {message}")]
    Decrypt {
        /// Description of the failure.
        message: String,
    },

    /// Encryption failed.
    #[error("encryption failed: {message}")]
    Encrypt {
        /// Description of the failure.
        message: String,
    },

    /// An encryption key had the wrong size.
    #[error("invalid key size: expected {expected} bytes, got {actual}")]
    InvalidKeySize {
        /// Expected size in bytes.
        expected: usize,
        /// Actual size in bytes.
        actual: usize,
    },

    /// An encoded key could not be parsed.
    #[error("key parse error: {0}")]
    ParseKey(#[from] nestdb_keycodec::CodecError),

    /// A stored value could not be deserialized.
    #[error("value parse error: {0}")]
    ParseValue(#[from] serde_json::Error),

    /// The transaction has been destroyed.
    #[error("transaction {id} is destroyed")]
    TransactionDestroyed {
        /// Id of the transaction.
        id: u64,
    },

    /// The transaction has been committed.
    #[error("transaction {id} is committed")]
    TransactionCommitted {
        /// Id of the transaction.
        id: u64,
    },

    /// The transaction has been rolled back.
    #[error("transaction {id} is rollbacked")]
    TransactionRollbacked {
        /// Id of the transaction.
        id: u64,
    },

    /// Destroy was attempted on a transaction in a non-terminal state.
    #[error("transaction {id} is neither committed nor rollbacked")]
    TransactionNotCommittedNorRollbacked {
        /// Id of the transaction.
        id: u64,
    },

    /// The optimistic commit was aborted by the engine.
    #[error("transaction {id} conflicted with a concurrent transaction")]
    TransactionConflict {
        /// Id of the transaction.
        id: u64,
    },

    /// A lock was re-requested with a different mode.
    #[error("lock {key:?} is already held with a different mode")]
    TransactionLockType {
        /// The lock key.
        key: String,
    },

    /// The iterator has been destroyed.
    #[error("iterator {id} is destroyed")]
    IteratorDestroyed {
        /// Id of the iterator.
        id: u64,
    },

    /// A `next` is already in flight on the iterator.
    #[error("iterator {id} is busy")]
    IteratorBusy {
        /// Id of the iterator.
        id: u64,
    },

    /// Error surfaced by the storage engine.
    #[error("engine error: {0}")]
    Engine(#[from] nestdb_engine::EngineError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl CoreError {
    /// Creates a canary validation error.
    pub fn key(message: impl Into<String>) -> Self {
        Self::Key {
            message: message.into(),
        }
    }

    /// Creates a decryption error.
    pub fn decrypt(message: impl Into<String>) -> Self {
        Self::Decrypt {
            message: message.into(),
        }
    }

    /// Creates an encryption error.
    pub fn encrypt(message: impl Into<String>) -> Self {
        Self::Encrypt {
            message: message.into(),
        }
    }

    /// Creates an invalid key size error.
    #[must_use]
    pub fn invalid_key_size(actual: usize, expected: usize) -> Self {
        Self::InvalidKeySize { expected, actual }
    }

    /// Creates a lock mode mismatch error.
    pub fn lock_type(key: impl Into<String>) -> Self {
        Self::TransactionLockType { key: key.into() }
    }
}
