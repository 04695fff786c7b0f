//! Core type definitions for NestDB.

use std::fmt;

/// Sequence number ordering committed writes, defined by the engine and
/// re-exported here alongside the other id newtypes.
pub use nestdb_engine::SequenceNumber;

/// Unique identifier for a transaction.
///
/// Transaction ids are monotonically increasing per database and never
/// reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransactionId(pub u64);

impl TransactionId {
    /// Creates a new transaction id.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw id value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn:{}", self.0)
    }
}

/// Unique identifier for an iterator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IteratorId(pub u64);

impl IteratorId {
    /// Creates a new iterator id.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw id value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for IteratorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "iter:{}", self.0)
    }
}

/// Lifecycle state of a database handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseStatus {
    /// Open and serving operations.
    Running,
    /// Stopped; resources released and the engine closed.
    Stopped,
    /// Stopped and its directory deleted.
    Destroyed,
}

/// Reserved top-level namespaces owned by the database.
///
/// User key paths are always prefixed with [`RootLevel::Data`] on the public
/// API, so reserved names can never collide with user data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RootLevel {
    /// User data.
    Data,
    /// The key-validation canary record.
    Canary,
}

impl RootLevel {
    /// The root level as a key-path part.
    pub(crate) const fn as_part(self) -> &'static [u8] {
        match self {
            Self::Data => b"data",
            Self::Canary => b"canary",
        }
    }
}
