//! # NestDB Core
//!
//! An embedded, encrypted, transactional key-value store with hierarchical
//! keys, layered over a log-structured-merge storage engine.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    Database                          │
//! │  (open/stop, data namespace, canary, registries)     │
//! └──────────┬──────────────────────────┬───────────────┘
//!            │                          │
//! ┌──────────▼──────────┐    ┌──────────▼───────────────┐
//! │    Transaction      │    │       DbIterator         │
//! │ (overlay, snapshot, │    │ (ranged batched reads,   │
//! │  locks, callbacks)  │    │  level-relative keys)    │
//! └──────────┬──────────┘    └──────────┬───────────────┘
//!            │                          │
//! ┌──────────▼──────────────────────────▼───────────────┐
//! │           KeyCodec + crypto envelope                 │
//! │  (key paths → ordered bytes, values → ciphertext)    │
//! └─────────────────────┬───────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────┐
//! │                Engine (trait)                        │
//! │  (flat ordered keys, snapshots, optimistic txns)     │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Key Invariants
//!
//! - **Namespacing**: user key paths always live under the reserved `data`
//!   root; iterated keys come back level-relative
//! - **Snapshot isolation**: transactions read a pinned view plus their own
//!   overlay; `get_for_update` upgrades reads for conflict detection
//! - **Deterministic shutdown**: `stop` drives every live iterator,
//!   transaction, and snapshot to completion before the engine closes
//! - **Exactly-once release**: engine handles are released once, enforced
//!   by per-wrapper flags plus the database registries
//!
//! ## Example
//!
//! ```rust,ignore
//! use nestdb_core::{Database, DatabaseOptions};
//! use serde_json::json;
//!
//! let db = Database::open("my_database", DatabaseOptions::default())?;
//!
//! db.put(["users", "alice"], &json!({"age": 30}), false)?;
//!
//! db.with_transaction(|txn| {
//!     let alice = txn.get_for_update(["users", "alice"])?;
//!     txn.put(["users", "alice", "visited"], &json!(true))?;
//!     Ok(())
//! })?;
//!
//! db.stop()?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
pub mod crypto;
mod database;
mod error;
mod iterator;
mod lockbox;
mod transaction;
mod types;

pub use config::DatabaseOptions;
pub use crypto::{Aes256GcmCipher, Cipher, Crypto, EncryptionKey};
pub use database::{Database, DbSnapshot, WriteOp};
pub use error::{CoreError, CoreResult};
pub use iterator::{ClearOptions, DbIterator, Entry, IteratorOptions};
pub use lockbox::{LockBox, LockGuard, LockMode, LockRequest};
pub use transaction::Transaction;
pub use types::{DatabaseStatus, IteratorId, SequenceNumber, TransactionId};

pub use nestdb_keycodec::KeyPath;

/// JSON value type stored by the non-raw API.
pub use serde_json::Value;
