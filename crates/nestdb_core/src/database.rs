//! Database facade and lifecycle.

use crate::config::DatabaseOptions;
use crate::crypto::{seal_value, unseal_value, Crypto};
use crate::error::{CoreError, CoreResult};
use crate::iterator::{
    compose_range, ClearOptions, DbIterator, IterOwner, IteratorInner, IteratorOptions, UserBounds,
};
use crate::lockbox::LockBox;
use crate::transaction::{Transaction, TransactionInner};
use crate::types::{DatabaseStatus, IteratorId, RootLevel, TransactionId};
use fs2::FileExt;
use nestdb_engine::{BatchOp, Engine, EngineSnapshot, MemoryEngine};
use nestdb_keycodec::{encode_key_path, encode_level_path, KeyPath};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

/// Name of the advisory lock file inside the database directory.
const LOCK_FILE: &str = "LOCK";

/// The canary plaintext validated at open.
const CANARY_VALUE: &str = "deadbeef";

/// Encodes a full key path under a reserved root level.
pub(crate) fn root_key(root: RootLevel, path: &KeyPath) -> Vec<u8> {
    let mut key = encode_level_path(&[root.as_part()]);
    key.extend(encode_key_path(path.parts()));
    key
}

/// Encodes a level-path prefix under a reserved root level.
pub(crate) fn root_level_prefix(root: RootLevel, levels: &KeyPath) -> Vec<u8> {
    let mut prefix = encode_level_path(&[root.as_part()]);
    prefix.extend(encode_level_path(levels.parts()));
    prefix
}

/// A single operation in an atomic write batch.
#[derive(Debug, Clone)]
pub enum WriteOp {
    /// Store a JSON value.
    Put {
        /// Key path under the data namespace.
        path: KeyPath,
        /// Value to serialize and store.
        value: serde_json::Value,
    },
    /// Store raw bytes.
    PutRaw {
        /// Key path under the data namespace.
        path: KeyPath,
        /// Bytes to store.
        bytes: Vec<u8>,
    },
    /// Delete a key.
    Del {
        /// Key path under the data namespace.
        path: KeyPath,
    },
}

impl WriteOp {
    /// Creates a put of a serializable value.
    pub fn put<V: Serialize + ?Sized>(path: impl Into<KeyPath>, value: &V) -> CoreResult<Self> {
        Ok(Self::Put {
            path: path.into(),
            value: serde_json::to_value(value)?,
        })
    }

    /// Creates a put of raw bytes.
    pub fn put_raw(path: impl Into<KeyPath>, bytes: Vec<u8>) -> Self {
        Self::PutRaw {
            path: path.into(),
            bytes,
        }
    }

    /// Creates a delete.
    pub fn del(path: impl Into<KeyPath>) -> Self {
        Self::Del { path: path.into() }
    }
}

pub(crate) struct SnapshotInner {
    id: u64,
    engine_snapshot: Arc<dyn EngineSnapshot>,
    released: AtomicBool,
    db: Weak<DatabaseInner>,
}

impl SnapshotInner {
    pub(crate) fn engine_ref(&self) -> &dyn EngineSnapshot {
        self.engine_snapshot.as_ref()
    }

    pub(crate) fn release(&self) -> CoreResult<()> {
        if self.released.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let Some(db) = self.db.upgrade() else {
            return Ok(());
        };
        db.snapshots.lock().remove(&self.id);
        db.engine.release_snapshot(self.engine_snapshot.as_ref())?;
        Ok(())
    }
}

/// A database-level snapshot handle.
///
/// The snapshot pins a point-in-time view usable by iterators, dumps, and
/// ranged deletes until [`release`](Self::release) is called. Snapshots left
/// unreleased are released by [`Database::stop`].
#[derive(Clone)]
pub struct DbSnapshot {
    pub(crate) inner: Arc<SnapshotInner>,
}

impl DbSnapshot {
    /// Releases the snapshot. Idempotent.
    pub fn release(&self) -> CoreResult<()> {
        self.inner.release()
    }
}

impl std::fmt::Debug for DbSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbSnapshot")
            .field("id", &self.inner.id)
            .finish()
    }
}

pub(crate) struct DatabaseInner {
    path: PathBuf,
    engine: Arc<dyn Engine>,
    crypto: Option<Crypto>,
    status: RwLock<DatabaseStatus>,
    /// Advisory file lock held for the lifetime of the handle.
    lock_file: Mutex<Option<File>>,
    next_transaction_id: AtomicU64,
    next_iterator_id: AtomicU64,
    next_snapshot_id: AtomicU64,
    transactions: Mutex<HashMap<TransactionId, Arc<TransactionInner>>>,
    iterators: Mutex<HashMap<IteratorId, Arc<IteratorInner>>>,
    snapshots: Mutex<HashMap<u64, Arc<SnapshotInner>>>,
    lockbox: Arc<LockBox>,
}

impl DatabaseInner {
    pub(crate) fn remove_iterator(&self, id: IteratorId) {
        self.iterators.lock().remove(&id);
    }

    pub(crate) fn remove_transaction(&self, id: TransactionId) {
        self.transactions.lock().remove(&id);
    }

    pub(crate) fn next_iterator_id(&self) -> IteratorId {
        IteratorId::new(self.next_iterator_id.fetch_add(1, Ordering::SeqCst))
    }
}

/// The main database handle.
///
/// `Database` is the entry point for the store. It owns the engine, the
/// encryption configuration, and the registries of live iterators,
/// transactions, and snapshots; stopping the database drives all of those
/// to completion before the engine closes, so no resource ever observes a
/// closed engine.
///
/// All user key paths live under a reserved `data` namespace which is
/// prepended on the way in and stripped from iterated keys on the way out.
///
/// # Example
///
/// ```rust,ignore
/// use nestdb_core::{Database, DatabaseOptions};
///
/// let db = Database::open("my_database", DatabaseOptions::default())?;
/// db.put(["users", "alice"], &serde_json::json!({"age": 30}), false)?;
/// let alice = db.get(["users", "alice"])?;
/// db.stop()?;
/// ```
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

impl Database {
    /// Opens a database at `path` using the built-in reference engine.
    ///
    /// The directory is created if absent. With `fresh` set, any existing
    /// directory is deleted first. With crypto configured, the canary
    /// record is validated before the handle is returned; a wrong key fails
    /// with a `Key` error and the engine is closed again so its lock does
    /// not linger.
    pub fn open(path: impl AsRef<Path>, options: DatabaseOptions) -> CoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        Self::prepare_directory(&path, &options)?;
        let lock_file = Self::acquire_lock(&path)?;

        let engine = MemoryEngine::open(&path, options.engine_options())?;
        Self::boot(path, options, Arc::new(engine), lock_file)
    }

    /// Opens a database on a caller-supplied engine.
    ///
    /// The engine must already be open; this handles the directory, the
    /// advisory lock, and the canary check.
    pub fn open_with_engine(
        path: impl AsRef<Path>,
        options: DatabaseOptions,
        engine: Arc<dyn Engine>,
    ) -> CoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        Self::prepare_directory(&path, &options)?;
        let lock_file = Self::acquire_lock(&path)?;
        Self::boot(path, options, engine, lock_file)
    }

    fn prepare_directory(path: &Path, options: &DatabaseOptions) -> CoreResult<()> {
        if options.fresh && path.exists() {
            fs::remove_dir_all(path).map_err(|source| CoreError::Delete {
                path: path.display().to_string(),
                source,
            })?;
        }
        fs::create_dir_all(path).map_err(|source| CoreError::Create {
            path: path.display().to_string(),
            source,
        })?;
        Ok(())
    }

    fn acquire_lock(path: &Path) -> CoreResult<File> {
        let lock_path = path.join(LOCK_FILE);
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(CoreError::Running);
        }
        Ok(lock_file)
    }

    fn boot(
        path: PathBuf,
        options: DatabaseOptions,
        engine: Arc<dyn Engine>,
        lock_file: File,
    ) -> CoreResult<Self> {
        let crypto = options.crypto.clone();

        if let Some(crypto) = &crypto {
            if let Err(error) = Self::check_canary(engine.as_ref(), crypto) {
                // Close the engine so its file lock does not persist past
                // the failed open.
                if let Err(close_error) = engine.close() {
                    warn!(%close_error, "engine close after failed canary check");
                }
                return Err(error);
            }
        }

        debug!(path = %path.display(), "database running");
        Ok(Self {
            inner: Arc::new(DatabaseInner {
                path,
                engine,
                crypto,
                status: RwLock::new(DatabaseStatus::Running),
                lock_file: Mutex::new(Some(lock_file)),
                next_transaction_id: AtomicU64::new(1),
                next_iterator_id: AtomicU64::new(1),
                next_snapshot_id: AtomicU64::new(1),
                transactions: Mutex::new(HashMap::new()),
                iterators: Mutex::new(HashMap::new()),
                snapshots: Mutex::new(HashMap::new()),
                lockbox: Arc::new(LockBox::new()),
            }),
        })
    }

    /// Validates the canary record against the configured key.
    fn check_canary(engine: &dyn Engine, crypto: &Crypto) -> CoreResult<()> {
        let key = encode_key_path(&[RootLevel::Canary.as_part()]);
        match engine.get(&key, None)? {
            None => {
                let plaintext = serde_json::to_vec(CANARY_VALUE)?;
                let sealed = crypto.seal(&plaintext)?;
                engine.put(&key, &sealed, true)?;
                Ok(())
            }
            Some(stored) => {
                let plaintext = crypto
                    .cipher
                    .decrypt(crypto.key.as_bytes(), &stored)
                    .ok_or_else(|| CoreError::key("incorrect key"))?;
                let value: serde_json::Value = serde_json::from_slice(&plaintext)
                    .map_err(|_| CoreError::key("incorrect key or database is corrupted"))?;
                if value == serde_json::Value::String(CANARY_VALUE.to_string()) {
                    Ok(())
                } else {
                    Err(CoreError::key("incorrect key or database is corrupted"))
                }
            }
        }
    }

    fn ensure_running(&self) -> CoreResult<()> {
        match *self.inner.status.read() {
            DatabaseStatus::Running => Ok(()),
            DatabaseStatus::Stopped => Err(CoreError::NotRunning),
            DatabaseStatus::Destroyed => Err(CoreError::Destroyed),
        }
    }

    /// Returns the database's lifecycle status.
    #[must_use]
    pub fn status(&self) -> DatabaseStatus {
        *self.inner.status.read()
    }

    /// Returns the database directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Reads a value as JSON.
    pub fn get(&self, path: impl Into<KeyPath>) -> CoreResult<Option<serde_json::Value>> {
        match self.get_raw(path)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Reads a value as raw bytes.
    pub fn get_raw(&self, path: impl Into<KeyPath>) -> CoreResult<Option<Vec<u8>>> {
        self.ensure_running()?;
        let key = root_key(RootLevel::Data, &path.into());
        let stored = self.inner.engine.get(&key, None)?;
        stored
            .map(|bytes| unseal_value(self.inner.crypto.as_ref(), &bytes))
            .transpose()
    }

    /// Stores a JSON-serialized value.
    pub fn put<V: Serialize + ?Sized>(
        &self,
        path: impl Into<KeyPath>,
        value: &V,
        sync: bool,
    ) -> CoreResult<()> {
        let plaintext = serde_json::to_vec(value)?;
        self.put_bytes(&path.into(), plaintext, sync)
    }

    /// Stores raw value bytes.
    pub fn put_raw(&self, path: impl Into<KeyPath>, bytes: &[u8], sync: bool) -> CoreResult<()> {
        self.put_bytes(&path.into(), bytes.to_vec(), sync)
    }

    fn put_bytes(&self, path: &KeyPath, plaintext: Vec<u8>, sync: bool) -> CoreResult<()> {
        self.ensure_running()?;
        let key = root_key(RootLevel::Data, path);
        let sealed = seal_value(self.inner.crypto.as_ref(), plaintext)?;
        self.inner.engine.put(&key, &sealed, sync)?;
        Ok(())
    }

    /// Deletes a key. Deleting an absent key is a no-op.
    pub fn del(&self, path: impl Into<KeyPath>, sync: bool) -> CoreResult<()> {
        self.ensure_running()?;
        let key = root_key(RootLevel::Data, &path.into());
        self.inner.engine.del(&key, sync)?;
        Ok(())
    }

    /// Applies a list of writes atomically.
    pub fn batch(&self, ops: Vec<WriteOp>, sync: bool) -> CoreResult<()> {
        self.ensure_running()?;
        let mut engine_ops = Vec::with_capacity(ops.len());
        for op in ops {
            match op {
                WriteOp::Put { path, value } => {
                    let plaintext = serde_json::to_vec(&value)?;
                    engine_ops.push(BatchOp::Put {
                        key: root_key(RootLevel::Data, &path),
                        value: seal_value(self.inner.crypto.as_ref(), plaintext)?,
                    });
                }
                WriteOp::PutRaw { path, bytes } => {
                    engine_ops.push(BatchOp::Put {
                        key: root_key(RootLevel::Data, &path),
                        value: seal_value(self.inner.crypto.as_ref(), bytes)?,
                    });
                }
                WriteOp::Del { path } => {
                    engine_ops.push(BatchOp::Del {
                        key: root_key(RootLevel::Data, &path),
                    });
                }
            }
        }
        self.inner.engine.batch(engine_ops, sync)?;
        Ok(())
    }

    /// Opens an iterator over the entries under `level`.
    ///
    /// Returned keys are relative to `level`.
    pub fn iterator(
        &self,
        level: impl Into<KeyPath>,
        opts: IteratorOptions,
    ) -> CoreResult<DbIterator> {
        let prefix = root_level_prefix(RootLevel::Data, &level.into());
        self.open_iterator(prefix, opts)
    }

    fn open_iterator(&self, prefix: Vec<u8>, opts: IteratorOptions) -> CoreResult<DbIterator> {
        self.ensure_running()?;
        let range = compose_range(&prefix, &UserBounds::from(&opts));
        let snapshot = opts.snapshot.as_ref().map(|s| s.inner.engine_ref());
        let engine_iter = self.inner.engine.iterator(range, opts.reverse, snapshot)?;

        let id = self.inner.next_iterator_id();
        let inner = Arc::new(IteratorInner::new(
            id,
            IterOwner::Database(Arc::downgrade(&self.inner)),
            self.inner.crypto.clone(),
            prefix,
            &opts,
            engine_iter,
        ));
        self.inner.iterators.lock().insert(id, Arc::clone(&inner));
        Ok(DbIterator { inner })
    }

    /// Deletes every key under `level` within the bounds.
    pub fn clear(&self, level: impl Into<KeyPath>, opts: &ClearOptions) -> CoreResult<()> {
        self.ensure_running()?;
        let prefix = root_level_prefix(RootLevel::Data, &level.into());
        let range = compose_range(&prefix, &UserBounds::from(opts));
        let snapshot = opts.snapshot.as_ref().map(|s| s.inner.engine_ref());
        self.inner.engine.clear(&range, snapshot, opts.sync)?;
        Ok(())
    }

    /// Counts the entries under `level` within the bounds.
    pub fn count(&self, level: impl Into<KeyPath>, opts: IteratorOptions) -> CoreResult<usize> {
        let opts = IteratorOptions {
            keys: false,
            values: false,
            ..opts
        };
        let iterator = self.iterator(level, opts)?;
        let mut count = 0;
        while iterator.next_entry()?.is_some() {
            count += 1;
        }
        iterator.destroy()?;
        Ok(count)
    }

    /// Dumps the entries under `level` as JSON values in ascending encoded
    /// key order.
    ///
    /// With `root` set the reserved namespaces are exposed: paths are
    /// absolute rather than data-relative, and the canary appears.
    pub fn dump(
        &self,
        level: impl Into<KeyPath>,
        root: bool,
    ) -> CoreResult<Vec<(KeyPath, serde_json::Value)>> {
        self.dump_raw(level, root)?
            .into_iter()
            .map(|(path, bytes)| Ok((path, serde_json::from_slice(&bytes)?)))
            .collect()
    }

    /// Dumps the entries under `level` as raw decrypted bytes.
    pub fn dump_raw(
        &self,
        level: impl Into<KeyPath>,
        root: bool,
    ) -> CoreResult<Vec<(KeyPath, Vec<u8>)>> {
        let level = level.into();
        let prefix = if root {
            encode_level_path(level.parts())
        } else {
            root_level_prefix(RootLevel::Data, &level)
        };
        let iterator = self.open_iterator(prefix, IteratorOptions::default())?;

        let mut entries = Vec::new();
        while let Some(entry) = iterator.next_entry()? {
            if let (Some(key), Some(value)) = (entry.key, entry.value) {
                entries.push((key, value));
            }
        }
        iterator.destroy()?;
        Ok(entries)
    }

    /// Acquires a database-level snapshot.
    pub fn snapshot(&self) -> CoreResult<DbSnapshot> {
        self.ensure_running()?;
        let engine_snapshot = self.inner.engine.snapshot()?;
        let id = self.inner.next_snapshot_id.fetch_add(1, Ordering::SeqCst);
        let inner = Arc::new(SnapshotInner {
            id,
            engine_snapshot,
            released: AtomicBool::new(false),
            db: Arc::downgrade(&self.inner),
        });
        self.inner.snapshots.lock().insert(id, Arc::clone(&inner));
        Ok(DbSnapshot { inner })
    }

    /// Begins an optimistic transaction.
    ///
    /// The engine transaction is created with synchronous writes forced;
    /// its snapshot is pinned lazily by the first read or write.
    pub fn transaction(&self) -> CoreResult<Transaction> {
        self.ensure_running()?;
        let engine_txn = self.inner.engine.transaction(true)?;
        let id = TransactionId::new(self.inner.next_transaction_id.fetch_add(1, Ordering::SeqCst));
        let inner = Arc::new(TransactionInner::new(
            id,
            Arc::downgrade(&self.inner),
            engine_txn,
            Arc::clone(&self.inner.lockbox),
            self.inner.crypto.clone(),
        ));
        self.inner.transactions.lock().insert(id, Arc::clone(&inner));
        Ok(Transaction { inner })
    }

    /// Runs `f` inside a transaction with scoped release semantics.
    ///
    /// On `Ok` the transaction commits (a failed commit is rolled back and
    /// its error - for conflicts, `TransactionConflict` - propagates); on
    /// `Err` it rolls back with the error passed to the `failure`
    /// callbacks. The transaction is destroyed in every outcome.
    pub fn with_transaction<T>(
        &self,
        f: impl FnOnce(&Transaction) -> CoreResult<T>,
    ) -> CoreResult<T> {
        let txn = self.transaction()?;
        match f(&txn) {
            Ok(value) => {
                if let Err(commit_error) = txn.commit() {
                    if let Err(rollback_error) = txn.rollback() {
                        debug!(%rollback_error, "rollback after failed commit");
                    }
                    let _ = txn.destroy();
                    return Err(commit_error);
                }
                txn.destroy()?;
                Ok(value)
            }
            Err(error) => {
                if let Err(rollback_error) = txn.rollback_with(Some(&error)) {
                    debug!(%rollback_error, "rollback after transaction body error");
                }
                let _ = txn.destroy();
                Err(error)
            }
        }
    }

    /// Stops the database.
    ///
    /// Destroys registered iterators, rolls back transactions that have not
    /// begun a terminal phase (awaiting those that have), releases leftover
    /// snapshots, closes the engine, and releases the directory lock.
    pub fn stop(&self) -> CoreResult<()> {
        {
            let mut status = self.inner.status.write();
            match *status {
                DatabaseStatus::Running => {}
                DatabaseStatus::Stopped => return Err(CoreError::NotRunning),
                DatabaseStatus::Destroyed => return Err(CoreError::Destroyed),
            }
            *status = DatabaseStatus::Stopped;
        }
        debug!(path = %self.inner.path.display(), "stopping database");

        let iterators: Vec<_> = self
            .inner
            .iterators
            .lock()
            .drain()
            .map(|(_, iter)| iter)
            .collect();
        for iterator in iterators {
            iterator.destroy()?;
        }

        let transactions: Vec<_> = self.inner.transactions.lock().values().cloned().collect();
        for transaction in transactions {
            transaction.finalize_for_stop()?;
        }

        let snapshots: Vec<_> = self
            .inner
            .snapshots
            .lock()
            .drain()
            .map(|(_, snap)| snap)
            .collect();
        for snapshot in snapshots {
            snapshot.release()?;
        }

        self.inner.engine.close()?;
        *self.inner.lock_file.lock() = None;
        debug!(path = %self.inner.path.display(), "database stopped");
        Ok(())
    }

    /// Deletes the database directory. Requires the database stopped.
    pub fn destroy(&self) -> CoreResult<()> {
        {
            let mut status = self.inner.status.write();
            match *status {
                DatabaseStatus::Running => return Err(CoreError::Running),
                DatabaseStatus::Destroyed => return Err(CoreError::Destroyed),
                DatabaseStatus::Stopped => {}
            }
            *status = DatabaseStatus::Destroyed;
        }
        fs::remove_dir_all(&self.inner.path).map_err(|source| CoreError::Delete {
            path: self.inner.path.display().to_string(),
            source,
        })?;
        Ok(())
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.inner.path)
            .field("status", &self.status())
            .field("encrypted", &self.inner.crypto.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::EncryptionKey;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn root_key_prefixes_namespace() {
        let path = KeyPath::from(["k"]);
        let data_key = root_key(RootLevel::Data, &path);
        let canary_prefixed = root_key(RootLevel::Canary, &path);

        assert!(data_key.starts_with(&encode_level_path(&[b"data".to_vec()])));
        assert_ne!(data_key, canary_prefixed);
    }

    #[test]
    fn root_key_normalizes_empty_path() {
        let empty = root_key(RootLevel::Data, &KeyPath::new());
        let explicit = root_key(RootLevel::Data, &KeyPath::from([""]));
        assert_eq!(empty, explicit);
    }

    #[test]
    fn write_op_constructors() {
        let op = WriteOp::put(["a"], &json!(1)).unwrap();
        assert!(matches!(op, WriteOp::Put { .. }));

        let op = WriteOp::put_raw(["a"], vec![1, 2]);
        assert!(matches!(op, WriteOp::PutRaw { .. }));

        let op = WriteOp::del(["a"]);
        assert!(matches!(op, WriteOp::Del { .. }));
    }

    #[test]
    fn open_creates_directory_and_runs() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("new_db");
        assert!(!path.exists());

        let db = Database::open(&path, DatabaseOptions::default()).unwrap();
        assert!(path.is_dir());
        assert_eq!(db.status(), DatabaseStatus::Running);
        db.stop().unwrap();
    }

    #[test]
    fn get_missing_returns_none() {
        let temp = tempdir().unwrap();
        let db = Database::open(temp.path(), DatabaseOptions::default()).unwrap();
        assert_eq!(db.get(["missing"]).unwrap(), None);
        db.stop().unwrap();
    }

    #[test]
    fn lock_released_after_stop() {
        let temp = tempdir().unwrap();
        {
            let db = Database::open(temp.path(), DatabaseOptions::default()).unwrap();
            db.stop().unwrap();
        }
        let db = Database::open(temp.path(), DatabaseOptions::default()).unwrap();
        db.stop().unwrap();
    }

    #[test]
    fn canary_written_on_first_encrypted_open() {
        let temp = tempdir().unwrap();
        let key = EncryptionKey::generate();

        {
            let db = Database::open(
                temp.path(),
                DatabaseOptions::default().crypto(Crypto::aes256gcm(key.clone())),
            )
            .unwrap();
            db.stop().unwrap();
        }

        // Same key revalidates against the stored canary.
        let db = Database::open(
            temp.path(),
            DatabaseOptions::default().crypto(Crypto::aes256gcm(key)),
        )
        .unwrap();
        let dump = db.dump(KeyPath::new(), true).unwrap();
        assert_eq!(dump, vec![(KeyPath::from(["canary"]), json!("deadbeef"))]);
        db.stop().unwrap();
    }

    #[test]
    fn transaction_ids_are_monotonic() {
        let temp = tempdir().unwrap();
        let db = Database::open(temp.path(), DatabaseOptions::default()).unwrap();

        let txn1 = db.transaction().unwrap();
        let txn2 = db.transaction().unwrap();
        assert!(txn1.id() < txn2.id());

        txn1.rollback().unwrap();
        txn2.rollback().unwrap();
        db.stop().unwrap();
    }
}
