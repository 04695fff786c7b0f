//! # NestDB Engine
//!
//! Storage engine abstraction for NestDB.
//!
//! This crate defines the seam between NestDB and a log-structured-merge
//! storage engine: flat byte keys in lexicographic order, point and batch
//! writes, ranged batch-reading iterators, snapshots, and optimistic
//! transactions with conflict detection at commit.
//!
//! ## Design Principles
//!
//! - The engine sees **opaque encoded keys and sealed values** - key-path
//!   structure and encryption live above this crate
//! - Handles the engine gives out (snapshots, transactions, iterators) must
//!   be released; the engine reports double or missing release as errors
//! - `NOT_FOUND` is `Ok(None)`, never an error
//! - Implementations must be `Send + Sync` behind the [`Engine`] trait
//!
//! ## Available Engines
//!
//! - [`MemoryEngine`] - reference engine: an in-memory MVCC map with
//!   optional append-only log persistence. Ephemeral stores serve tests;
//!   persistent stores replay their log at open.
//!
//! ## Example
//!
//! ```
//! use nestdb_engine::{Engine, MemoryEngine};
//!
//! let engine = MemoryEngine::in_memory();
//! engine.put(b"key", b"value", false).unwrap();
//! assert_eq!(engine.get(b"key", None).unwrap(), Some(b"value".to_vec()));
//! engine.close().unwrap();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod engine;
mod error;
mod log;
mod memory;
mod options;

pub use engine::{
    BatchOp, Engine, EngineIterator, EngineSnapshot, EngineTransaction, Entry, KeyRange,
    SequenceNumber,
};
pub use error::{EngineError, EngineResult};
pub use log::{compute_crc32, Log, LOG_MAGIC, LOG_VERSION};
pub use memory::MemoryEngine;
pub use options::{EngineOptions, InfoLogLevel};
