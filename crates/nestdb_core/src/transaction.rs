//! Optimistic transactions.
//!
//! A transaction layers a private write overlay over a snapshot view of the
//! database. The snapshot is not taken eagerly: it is pinned by the first
//! operation that reads or writes (or by an explicit
//! [`set_snapshot`](Transaction::set_snapshot)), and conflict detection for
//! tracked keys begins at that point. Plain reads are not tracked; use
//! [`get_for_update`](Transaction::get_for_update) to upgrade a read into a
//! tracked one so that multi-key invariants are protected against
//! write-skew.
//!
//! Lifecycle: `commit` and `rollback` each drive the transaction to a
//! terminal state, run the registered callback queues, and destroy the
//! transaction; both are idempotent once their own terminal state is
//! reached and mutually exclusive across states.

use crate::crypto::{seal_value, unseal_value, Crypto};
use crate::database::DatabaseInner;
use crate::error::{CoreError, CoreResult};
use crate::iterator::{
    compose_range, ClearOptions, DbIterator, IterOwner, IteratorInner, IteratorOptions, UserBounds,
};
use crate::lockbox::{LockBox, LockGuard, LockMode, LockRequest};
use crate::types::{IteratorId, RootLevel, TransactionId};
use nestdb_engine::{EngineError, EngineTransaction};
use nestdb_keycodec::KeyPath;
use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tracing::warn;

type SuccessCallback = Box<dyn FnOnce() -> CoreResult<()> + Send>;
type FailureCallback = Box<dyn FnOnce(Option<&CoreError>) -> CoreResult<()> + Send>;
type FinallyCallback = Box<dyn FnOnce() -> CoreResult<()> + Send>;

#[derive(Debug, Default, Clone, Copy)]
struct Lifecycle {
    committing: bool,
    committed: bool,
    rollbacking: bool,
    rollbacked: bool,
    destroyed: bool,
}

#[derive(Default)]
struct Callbacks {
    success: Vec<SuccessCallback>,
    failure: Vec<FailureCallback>,
    finally: Vec<FinallyCallback>,
}

pub(crate) struct TransactionInner {
    id: TransactionId,
    db: Weak<DatabaseInner>,
    engine_txn: Mutex<Box<dyn EngineTransaction>>,
    lifecycle: Mutex<Lifecycle>,
    /// Signalled on every lifecycle edge; `stop` waits here for
    /// transactions already in a terminal phase.
    lifecycle_changed: Condvar,
    iterators: Mutex<HashMap<IteratorId, Arc<IteratorInner>>>,
    /// Held advisory locks in acquisition order.
    locks: Mutex<Vec<LockGuard>>,
    lockbox: Arc<LockBox>,
    callbacks: Mutex<Callbacks>,
    crypto: Option<Crypto>,
}

impl TransactionInner {
    pub(crate) fn new(
        id: TransactionId,
        db: Weak<DatabaseInner>,
        engine_txn: Box<dyn EngineTransaction>,
        lockbox: Arc<LockBox>,
        crypto: Option<Crypto>,
    ) -> Self {
        Self {
            id,
            db,
            engine_txn: Mutex::new(engine_txn),
            lifecycle: Mutex::new(Lifecycle::default()),
            lifecycle_changed: Condvar::new(),
            iterators: Mutex::new(HashMap::new()),
            locks: Mutex::new(Vec::new()),
            lockbox,
            callbacks: Mutex::new(Callbacks::default()),
            crypto,
        }
    }

    pub(crate) fn id(&self) -> TransactionId {
        self.id
    }

    fn raw_id(&self) -> u64 {
        self.id.as_u64()
    }

    fn ensure_active(&self) -> CoreResult<()> {
        let lifecycle = self.lifecycle.lock();
        if lifecycle.destroyed {
            Err(CoreError::TransactionDestroyed { id: self.raw_id() })
        } else if lifecycle.committed || lifecycle.committing {
            Err(CoreError::TransactionCommitted { id: self.raw_id() })
        } else if lifecycle.rollbacked || lifecycle.rollbacking {
            Err(CoreError::TransactionRollbacked { id: self.raw_id() })
        } else {
            Ok(())
        }
    }

    /// Pins the snapshot if no operation has done so yet.
    fn setup_snapshot(&self) -> CoreResult<()> {
        let mut engine_txn = self.engine_txn.lock();
        if !engine_txn.has_snapshot() {
            engine_txn.set_snapshot()?;
        }
        Ok(())
    }

    fn get_bytes(&self, path: &KeyPath, for_update: bool) -> CoreResult<Option<Vec<u8>>> {
        self.ensure_active()?;
        self.setup_snapshot()?;
        let key = crate::database::root_key(RootLevel::Data, path);
        let mut engine_txn = self.engine_txn.lock();
        let stored = if for_update {
            engine_txn.get_for_update(&key)?
        } else {
            engine_txn.get(&key)?
        };
        stored
            .map(|bytes| unseal_value(self.crypto.as_ref(), &bytes))
            .transpose()
    }

    fn multi_get_bytes(
        &self,
        paths: &[KeyPath],
        for_update: bool,
    ) -> CoreResult<Vec<Option<Vec<u8>>>> {
        self.ensure_active()?;
        self.setup_snapshot()?;
        let keys: Vec<Vec<u8>> = paths
            .iter()
            .map(|path| crate::database::root_key(RootLevel::Data, path))
            .collect();
        let mut engine_txn = self.engine_txn.lock();
        let stored = if for_update {
            engine_txn.multi_get_for_update(&keys)?
        } else {
            engine_txn.multi_get(&keys)?
        };
        stored
            .into_iter()
            .map(|entry| {
                entry
                    .map(|bytes| unseal_value(self.crypto.as_ref(), &bytes))
                    .transpose()
            })
            .collect()
    }

    fn put_bytes(&self, path: &KeyPath, plaintext: Vec<u8>) -> CoreResult<()> {
        self.ensure_active()?;
        self.setup_snapshot()?;
        let key = crate::database::root_key(RootLevel::Data, path);
        let sealed = seal_value(self.crypto.as_ref(), plaintext)?;
        self.engine_txn.lock().put(&key, &sealed)?;
        Ok(())
    }

    fn del(&self, path: &KeyPath) -> CoreResult<()> {
        self.ensure_active()?;
        self.setup_snapshot()?;
        let key = crate::database::root_key(RootLevel::Data, path);
        self.engine_txn.lock().del(&key)?;
        Ok(())
    }

    fn iterator(self: &Arc<Self>, level: &KeyPath, opts: IteratorOptions) -> CoreResult<DbIterator> {
        self.ensure_active()?;
        self.setup_snapshot()?;
        let db = self.db.upgrade().ok_or(CoreError::NotRunning)?;

        let prefix = crate::database::root_level_prefix(RootLevel::Data, level);
        let range = compose_range(&prefix, &UserBounds::from(&opts));
        let engine_iter = self.engine_txn.lock().iterator(range, opts.reverse)?;

        let id = db.next_iterator_id();
        let inner = Arc::new(IteratorInner::new(
            id,
            IterOwner::Transaction(Arc::downgrade(self)),
            self.crypto.clone(),
            prefix,
            &opts,
            engine_iter,
        ));
        self.iterators.lock().insert(id, Arc::clone(&inner));
        Ok(DbIterator { inner })
    }

    fn clear(&self, level: &KeyPath, opts: &ClearOptions) -> CoreResult<()> {
        self.ensure_active()?;
        self.setup_snapshot()?;
        let prefix = crate::database::root_level_prefix(RootLevel::Data, level);
        let range = compose_range(&prefix, &UserBounds::from(opts));
        self.engine_txn.lock().clear(&range)?;
        Ok(())
    }

    fn lock(&self, requests: Vec<LockRequest>) -> CoreResult<()> {
        self.ensure_active()?;

        let mut to_acquire: Vec<LockRequest> = Vec::new();
        {
            let held = self.locks.lock();
            for request in requests {
                match held.iter().find(|guard| guard.key() == request.key) {
                    // Re-requesting a held key in the same mode is a no-op.
                    Some(guard) if guard.mode() == request.mode => {}
                    Some(_) => return Err(CoreError::lock_type(request.key)),
                    None => match to_acquire.iter_mut().find(|r| r.key == request.key) {
                        Some(pending) => {
                            if request.mode == LockMode::Write {
                                pending.mode = LockMode::Write;
                            }
                        }
                        None => to_acquire.push(request),
                    },
                }
            }
        }

        if to_acquire.is_empty() {
            return Ok(());
        }
        // Blocking acquisition happens outside the lock-table mutex.
        let guards = self.lockbox.lock_multi(&to_acquire);
        self.locks.lock().extend(guards);
        Ok(())
    }

    fn unlock(&self, keys: Vec<String>) -> CoreResult<()> {
        self.ensure_active()?;
        let mut held = self.locks.lock();
        for key in keys {
            if let Some(pos) = held.iter().position(|guard| guard.key() == key) {
                let guard = held.remove(pos);
                drop(guard);
                self.lockbox.prune(&key);
            }
        }
        Ok(())
    }

    fn destroy_iterators(&self) {
        let iterators: Vec<_> = self
            .iterators
            .lock()
            .drain()
            .map(|(_, iter)| iter)
            .collect();
        for iterator in iterators {
            if let Err(error) = iterator.destroy() {
                warn!(id = %self.id, %error, "failed to destroy transaction iterator");
            }
        }
    }

    fn run_success_callbacks(&self) -> CoreResult<()> {
        let callbacks = std::mem::take(&mut self.callbacks.lock().success);
        let mut first_error = None;
        for callback in callbacks {
            if let Err(error) = callback() {
                if first_error.is_none() {
                    first_error = Some(error);
                } else {
                    warn!(id = %self.id, %error, "additional success callback error");
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn run_failure_callbacks(&self, error: Option<&CoreError>) -> CoreResult<()> {
        let callbacks = std::mem::take(&mut self.callbacks.lock().failure);
        let mut first_error = None;
        for callback in callbacks {
            if let Err(error) = callback(error) {
                if first_error.is_none() {
                    first_error = Some(error);
                } else {
                    warn!(id = %self.id, %error, "additional failure callback error");
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn run_finally_callbacks(&self) -> CoreResult<()> {
        let callbacks = std::mem::take(&mut self.callbacks.lock().finally);
        let mut first_error = None;
        for callback in callbacks {
            if let Err(error) = callback() {
                if first_error.is_none() {
                    first_error = Some(error);
                } else {
                    warn!(id = %self.id, %error, "additional finally callback error");
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    pub(crate) fn commit(self: &Arc<Self>) -> CoreResult<()> {
        {
            let mut lifecycle = self.lifecycle.lock();
            if lifecycle.rollbacked || lifecycle.rollbacking {
                return Err(CoreError::TransactionRollbacked { id: self.raw_id() });
            }
            if lifecycle.committed {
                return Ok(());
            }
            if lifecycle.committing {
                // Another caller is committing; wait for the terminal state.
                while !lifecycle.committed {
                    self.lifecycle_changed.wait(&mut lifecycle);
                }
                return Ok(());
            }
            lifecycle.committing = true;
        }

        self.destroy_iterators();
        let engine_result = self.engine_txn.lock().commit();
        {
            let mut lifecycle = self.lifecycle.lock();
            lifecycle.committed = true;
            self.lifecycle_changed.notify_all();
        }

        let result = match engine_result {
            Ok(()) => {
                let success_result = self.run_success_callbacks();
                let finally_result = self.run_finally_callbacks();
                success_result.and(finally_result)
            }
            Err(EngineError::Conflict) => {
                if let Err(error) = self.run_finally_callbacks() {
                    warn!(id = %self.id, %error, "finally callback error during conflict");
                }
                Err(CoreError::TransactionConflict { id: self.raw_id() })
            }
            Err(error) => {
                if let Err(error) = self.run_finally_callbacks() {
                    warn!(id = %self.id, %error, "finally callback error during failed commit");
                }
                Err(error.into())
            }
        };

        let destroy_result = self.destroy();
        result.and(destroy_result)
    }

    pub(crate) fn rollback(self: &Arc<Self>, error: Option<&CoreError>) -> CoreResult<()> {
        {
            let mut lifecycle = self.lifecycle.lock();
            if lifecycle.committed || lifecycle.committing {
                return Err(CoreError::TransactionCommitted { id: self.raw_id() });
            }
            if lifecycle.rollbacked {
                return Ok(());
            }
            if lifecycle.rollbacking {
                while !lifecycle.rollbacked {
                    self.lifecycle_changed.wait(&mut lifecycle);
                }
                return Ok(());
            }
            lifecycle.rollbacking = true;
        }

        self.destroy_iterators();
        let engine_result = self.engine_txn.lock().rollback();
        {
            let mut lifecycle = self.lifecycle.lock();
            lifecycle.rollbacked = true;
            self.lifecycle_changed.notify_all();
        }

        let failure_result = self.run_failure_callbacks(error);
        let finally_result = self.run_finally_callbacks();
        let destroy_result = self.destroy();

        engine_result
            .map_err(Into::into)
            .and(failure_result)
            .and(finally_result)
            .and(destroy_result)
    }

    /// Releases held locks in reverse acquisition order and deregisters the
    /// transaction. Requires a terminal state; idempotent once destroyed.
    pub(crate) fn destroy(&self) -> CoreResult<()> {
        {
            let mut lifecycle = self.lifecycle.lock();
            if lifecycle.destroyed {
                return Ok(());
            }
            if !(lifecycle.committed || lifecycle.rollbacked) {
                return Err(CoreError::TransactionNotCommittedNorRollbacked { id: self.raw_id() });
            }
            lifecycle.destroyed = true;
            self.lifecycle_changed.notify_all();
        }

        {
            let mut locks = self.locks.lock();
            while let Some(guard) = locks.pop() {
                let key = guard.key().to_string();
                drop(guard);
                self.lockbox.prune(&key);
            }
        }

        if let Some(db) = self.db.upgrade() {
            db.remove_transaction(self.id);
        }
        Ok(())
    }

    /// Drives a dangling transaction to destruction during database stop:
    /// rolls it back unless a terminal phase is already underway, in which
    /// case that phase is awaited.
    pub(crate) fn finalize_for_stop(self: &Arc<Self>) -> CoreResult<()> {
        {
            let mut lifecycle = self.lifecycle.lock();
            if lifecycle.destroyed {
                return Ok(());
            }
            if lifecycle.committing
                || lifecycle.rollbacking
                || lifecycle.committed
                || lifecycle.rollbacked
            {
                while !lifecycle.destroyed {
                    self.lifecycle_changed.wait(&mut lifecycle);
                }
                return Ok(());
            }
        }
        warn!(id = %self.id, "rolling back dangling transaction at stop");
        self.rollback(None)
    }

    pub(crate) fn remove_iterator(&self, id: IteratorId) {
        self.iterators.lock().remove(&id);
    }

    fn lifecycle_snapshot(&self) -> Lifecycle {
        *self.lifecycle.lock()
    }
}

/// A handle to an optimistic transaction.
///
/// Handles are cheap to hold after the transaction finishes: operations on
/// a finished transaction report its terminal state rather than panicking,
/// so a handle left dangling across [`Database::stop`](crate::Database::stop)
/// simply reports `TransactionRollbacked` when released.
pub struct Transaction {
    pub(crate) inner: Arc<TransactionInner>,
}

impl Transaction {
    /// Returns this transaction's id.
    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.inner.id()
    }

    /// Pins the snapshot now instead of on the first operation.
    pub fn set_snapshot(&self) -> CoreResult<()> {
        self.inner.ensure_active()?;
        self.inner.setup_snapshot()
    }

    /// Reads a value as JSON.
    pub fn get(&self, path: impl Into<KeyPath>) -> CoreResult<Option<serde_json::Value>> {
        match self.inner.get_bytes(&path.into(), false)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Reads a value as raw bytes.
    pub fn get_raw(&self, path: impl Into<KeyPath>) -> CoreResult<Option<Vec<u8>>> {
        self.inner.get_bytes(&path.into(), false)
    }

    /// Reads a value as JSON and tracks the key for conflict detection.
    pub fn get_for_update(
        &self,
        path: impl Into<KeyPath>,
    ) -> CoreResult<Option<serde_json::Value>> {
        match self.inner.get_bytes(&path.into(), true)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Reads raw bytes and tracks the key for conflict detection.
    pub fn get_for_update_raw(&self, path: impl Into<KeyPath>) -> CoreResult<Option<Vec<u8>>> {
        self.inner.get_bytes(&path.into(), true)
    }

    /// Bulk [`get`](Self::get).
    pub fn multi_get(&self, paths: &[KeyPath]) -> CoreResult<Vec<Option<serde_json::Value>>> {
        self.inner
            .multi_get_bytes(paths, false)?
            .into_iter()
            .map(|entry| match entry {
                Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
                None => Ok(None),
            })
            .collect()
    }

    /// Bulk [`get_for_update`](Self::get_for_update).
    pub fn multi_get_for_update(
        &self,
        paths: &[KeyPath],
    ) -> CoreResult<Vec<Option<serde_json::Value>>> {
        self.inner
            .multi_get_bytes(paths, true)?
            .into_iter()
            .map(|entry| match entry {
                Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
                None => Ok(None),
            })
            .collect()
    }

    /// Stages a JSON-serialized value in the overlay.
    pub fn put<V: Serialize + ?Sized>(
        &self,
        path: impl Into<KeyPath>,
        value: &V,
    ) -> CoreResult<()> {
        let plaintext = serde_json::to_vec(value)?;
        self.inner.put_bytes(&path.into(), plaintext)
    }

    /// Stages raw value bytes in the overlay.
    pub fn put_raw(&self, path: impl Into<KeyPath>, bytes: &[u8]) -> CoreResult<()> {
        self.inner.put_bytes(&path.into(), bytes.to_vec())
    }

    /// Stages a delete in the overlay.
    pub fn del(&self, path: impl Into<KeyPath>) -> CoreResult<()> {
        self.inner.del(&path.into())
    }

    /// Opens an iterator over `level` that overlays this transaction's
    /// pending writes on its snapshot view of the database.
    pub fn iterator(
        &self,
        level: impl Into<KeyPath>,
        opts: IteratorOptions,
    ) -> CoreResult<DbIterator> {
        self.inner.iterator(&level.into(), opts)
    }

    /// Stages deletes for every key under `level` within the bounds.
    pub fn clear(&self, level: impl Into<KeyPath>, opts: &ClearOptions) -> CoreResult<()> {
        self.inner.clear(&level.into(), opts)
    }

    /// Counts entries under `level` within the bounds.
    pub fn count(&self, level: impl Into<KeyPath>, opts: IteratorOptions) -> CoreResult<usize> {
        let opts = IteratorOptions {
            keys: false,
            values: false,
            snapshot: None,
            ..opts
        };
        let iterator = self.inner.iterator(&level.into(), opts)?;
        let mut count = 0;
        while iterator.next_entry()?.is_some() {
            count += 1;
        }
        iterator.destroy()?;
        Ok(count)
    }

    /// Acquires advisory locks, attaching their release to this
    /// transaction.
    ///
    /// New keys are acquired in sorted order. Re-requesting a held key in
    /// the same mode is a no-op; in a different mode it fails with
    /// `TransactionLockType`. All held locks release on destroy, in reverse
    /// acquisition order.
    pub fn lock<R: Into<LockRequest>>(
        &self,
        requests: impl IntoIterator<Item = R>,
    ) -> CoreResult<()> {
        self.inner
            .lock(requests.into_iter().map(Into::into).collect())
    }

    /// Releases held locks in the given order.
    pub fn unlock<K: Into<String>>(&self, keys: impl IntoIterator<Item = K>) -> CoreResult<()> {
        self.inner.unlock(keys.into_iter().map(Into::into).collect())
    }

    /// Registers a callback to run after a successful commit.
    pub fn queue_success(
        &self,
        callback: impl FnOnce() -> CoreResult<()> + Send + 'static,
    ) -> CoreResult<()> {
        self.inner.ensure_active()?;
        self.inner.callbacks.lock().success.push(Box::new(callback));
        Ok(())
    }

    /// Registers a callback to run after a rollback, receiving the rollback
    /// cause when there is one.
    pub fn queue_failure(
        &self,
        callback: impl FnOnce(Option<&CoreError>) -> CoreResult<()> + Send + 'static,
    ) -> CoreResult<()> {
        self.inner.ensure_active()?;
        self.inner.callbacks.lock().failure.push(Box::new(callback));
        Ok(())
    }

    /// Registers a callback to run after commit or rollback, either way.
    pub fn queue_finally(
        &self,
        callback: impl FnOnce() -> CoreResult<()> + Send + 'static,
    ) -> CoreResult<()> {
        self.inner.ensure_active()?;
        self.inner.callbacks.lock().finally.push(Box::new(callback));
        Ok(())
    }

    /// Commits the transaction.
    ///
    /// Destroys owned iterators first, then performs the engine commit. A
    /// concurrent modification of a tracked key surfaces as
    /// `TransactionConflict` (after the `finally` callbacks have run) so
    /// the caller can retry. The transaction is destroyed in all outcomes.
    pub fn commit(&self) -> CoreResult<()> {
        self.inner.commit()
    }

    /// Rolls the transaction back, discarding the overlay.
    pub fn rollback(&self) -> CoreResult<()> {
        self.inner.rollback(None)
    }

    /// Rolls back with a cause passed to the `failure` callbacks.
    pub fn rollback_with(&self, error: Option<&CoreError>) -> CoreResult<()> {
        self.inner.rollback(error)
    }

    /// Destroys the transaction. Requires a terminal state; idempotent.
    pub fn destroy(&self) -> CoreResult<()> {
        self.inner.destroy()
    }

    /// Returns true once the transaction has committed.
    #[must_use]
    pub fn is_committed(&self) -> bool {
        self.inner.lifecycle_snapshot().committed
    }

    /// Returns true once the transaction has rolled back.
    #[must_use]
    pub fn is_rollbacked(&self) -> bool {
        self.inner.lifecycle_snapshot().rollbacked
    }

    /// Returns true once the transaction has been destroyed.
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.inner.lifecycle_snapshot().destroyed
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let lifecycle = self.inner.lifecycle_snapshot();
        f.debug_struct("Transaction")
            .field("id", &self.inner.id())
            .field("committed", &lifecycle.committed)
            .field("rollbacked", &lifecycle.rollbacked)
            .field("destroyed", &lifecycle.destroyed)
            .finish()
    }
}
