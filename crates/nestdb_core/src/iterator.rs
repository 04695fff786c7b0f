//! Ranged, ordered, snapshot-consistent iteration.
//!
//! Iterators read entries from the engine in adaptive batches: the first
//! batch holds a single entry so `let first = iter.next_entry()?` stays
//! cheap, and every batch after that holds up to a thousand entries so full
//! scans amortize the per-call overhead. Returned keys are level-relative:
//! the iterator's encoded level prefix is stripped before decoding.

use crate::crypto::{unseal_value, Crypto};
use crate::database::{DatabaseInner, DbSnapshot};
use crate::error::{CoreError, CoreResult};
use crate::transaction::TransactionInner;
use crate::types::IteratorId;
use nestdb_engine::{EngineIterator, KeyRange};
use nestdb_keycodec::{decode_key, encode_key_path, next_lex, KeyPath};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// Batch size for the first read.
const FIRST_BATCH: usize = 1;
/// Batch size for every read after the first.
const NEXT_BATCH: usize = 1000;

/// Options for iterators and counts.
///
/// Range bounds are key paths relative to the iterated level; they compose
/// with the level's encoded prefix. Absent lower/upper bounds default to the
/// level's own boundaries.
#[derive(Debug, Clone)]
pub struct IteratorOptions {
    /// Exclusive lower bound, relative to the level.
    pub gt: Option<KeyPath>,
    /// Inclusive lower bound, relative to the level.
    pub gte: Option<KeyPath>,
    /// Exclusive upper bound, relative to the level.
    pub lt: Option<KeyPath>,
    /// Inclusive upper bound, relative to the level.
    pub lte: Option<KeyPath>,
    /// Maximum number of entries to yield; `None` is unlimited.
    pub limit: Option<usize>,
    /// Iterate in descending key order.
    pub reverse: bool,
    /// Decode keys; when false, entries carry no key.
    pub keys: bool,
    /// Decode (and decrypt) values; when false, entries carry no value.
    pub values: bool,
    /// Explicit snapshot for database-level iterators. Transaction
    /// iterators always observe the transaction's own snapshot instead.
    pub snapshot: Option<DbSnapshot>,
}

impl Default for IteratorOptions {
    fn default() -> Self {
        Self {
            gt: None,
            gte: None,
            lt: None,
            lte: None,
            limit: None,
            reverse: false,
            keys: true,
            values: true,
            snapshot: None,
        }
    }
}

impl IteratorOptions {
    /// Creates options with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets an exclusive lower bound.
    #[must_use]
    pub fn gt(mut self, path: impl Into<KeyPath>) -> Self {
        self.gt = Some(path.into());
        self
    }

    /// Sets an inclusive lower bound.
    #[must_use]
    pub fn gte(mut self, path: impl Into<KeyPath>) -> Self {
        self.gte = Some(path.into());
        self
    }

    /// Sets an exclusive upper bound.
    #[must_use]
    pub fn lt(mut self, path: impl Into<KeyPath>) -> Self {
        self.lt = Some(path.into());
        self
    }

    /// Sets an inclusive upper bound.
    #[must_use]
    pub fn lte(mut self, path: impl Into<KeyPath>) -> Self {
        self.lte = Some(path.into());
        self
    }

    /// Caps the number of entries yielded.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets descending iteration order.
    #[must_use]
    pub fn reverse(mut self, value: bool) -> Self {
        self.reverse = value;
        self
    }

    /// Sets whether keys are decoded.
    #[must_use]
    pub fn keys(mut self, value: bool) -> Self {
        self.keys = value;
        self
    }

    /// Sets whether values are decoded.
    #[must_use]
    pub fn values(mut self, value: bool) -> Self {
        self.values = value;
        self
    }

    /// Pins the iterator to an explicit database snapshot.
    #[must_use]
    pub fn snapshot(mut self, snapshot: DbSnapshot) -> Self {
        self.snapshot = Some(snapshot);
        self
    }
}

/// Options for ranged deletes.
#[derive(Debug, Clone, Default)]
pub struct ClearOptions {
    /// Exclusive lower bound, relative to the level.
    pub gt: Option<KeyPath>,
    /// Inclusive lower bound, relative to the level.
    pub gte: Option<KeyPath>,
    /// Exclusive upper bound, relative to the level.
    pub lt: Option<KeyPath>,
    /// Inclusive upper bound, relative to the level.
    pub lte: Option<KeyPath>,
    /// Explicit snapshot selecting which keys are visible to the delete.
    pub snapshot: Option<DbSnapshot>,
    /// Synchronous write-through for the deletes.
    pub sync: bool,
}

/// One entry yielded by an iterator.
///
/// `key` is the level-relative key path; `value` is the decrypted stored
/// bytes. Either is `None` when its decoding was disabled in the options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Level-relative key path.
    pub key: Option<KeyPath>,
    /// Decrypted value bytes.
    pub value: Option<Vec<u8>>,
}

impl Entry {
    /// Parses the value bytes as JSON.
    pub fn json(&self) -> CoreResult<Option<serde_json::Value>> {
        self.value
            .as_deref()
            .map(serde_json::from_slice)
            .transpose()
            .map_err(Into::into)
    }
}

/// User-supplied range bounds, borrowed from an options struct.
pub(crate) struct UserBounds<'a> {
    pub gt: Option<&'a KeyPath>,
    pub gte: Option<&'a KeyPath>,
    pub lt: Option<&'a KeyPath>,
    pub lte: Option<&'a KeyPath>,
}

impl<'a> From<&'a IteratorOptions> for UserBounds<'a> {
    fn from(opts: &'a IteratorOptions) -> Self {
        Self {
            gt: opts.gt.as_ref(),
            gte: opts.gte.as_ref(),
            lt: opts.lt.as_ref(),
            lte: opts.lte.as_ref(),
        }
    }
}

impl<'a> From<&'a ClearOptions> for UserBounds<'a> {
    fn from(opts: &'a ClearOptions) -> Self {
        Self {
            gt: opts.gt.as_ref(),
            gte: opts.gte.as_ref(),
            lt: opts.lt.as_ref(),
            lte: opts.lte.as_ref(),
        }
    }
}

/// Derives the engine key range for a level prefix plus user bounds.
///
/// User bounds compose by concatenation with the prefix. Without a lower
/// bound the prefix itself is the exclusive floor; without an upper bound
/// the prefix's lexicographic successor caps the range, giving the
/// half-open window that contains exactly the keys under the level.
pub(crate) fn compose_range(prefix: &[u8], bounds: &UserBounds<'_>) -> KeyRange {
    let compose = |path: &KeyPath| {
        let mut key = prefix.to_vec();
        key.extend(encode_key_path(path.parts()));
        key
    };

    let mut range = KeyRange::default();
    if let Some(bound) = bounds.gt {
        range.gt = Some(compose(bound));
    }
    if let Some(bound) = bounds.gte {
        range.gte = Some(compose(bound));
    }
    if bounds.gt.is_none() && bounds.gte.is_none() {
        range.gt = Some(prefix.to_vec());
    }
    if let Some(bound) = bounds.lt {
        range.lt = Some(compose(bound));
    }
    if let Some(bound) = bounds.lte {
        range.lte = Some(compose(bound));
    }
    if bounds.lt.is_none() && bounds.lte.is_none() {
        range.lt = next_lex(prefix);
    }
    range
}

/// The owner whose registry tracks an iterator.
pub(crate) enum IterOwner {
    Database(Weak<DatabaseInner>),
    Transaction(Weak<TransactionInner>),
}

struct IterState {
    engine_iter: Option<Box<dyn EngineIterator>>,
    first: bool,
    finished: bool,
    cache: VecDeque<(Vec<u8>, Vec<u8>)>,
    returned: usize,
}

pub(crate) struct IteratorInner {
    id: IteratorId,
    owner: IterOwner,
    crypto: Option<Crypto>,
    prefix: Vec<u8>,
    limit: Option<usize>,
    decode_keys: bool,
    decode_values: bool,
    state: Mutex<IterState>,
    /// Latch rejecting a second `next` while one is in flight.
    busy: AtomicBool,
    destroyed: AtomicBool,
}

/// Clears the busy latch when a `next`/`seek` unwinds.
struct BusyReset<'a>(&'a AtomicBool);

impl Drop for BusyReset<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl IteratorInner {
    pub(crate) fn new(
        id: IteratorId,
        owner: IterOwner,
        crypto: Option<Crypto>,
        prefix: Vec<u8>,
        opts: &IteratorOptions,
        engine_iter: Box<dyn EngineIterator>,
    ) -> Self {
        Self {
            id,
            owner,
            crypto,
            prefix,
            limit: opts.limit,
            decode_keys: opts.keys,
            decode_values: opts.values,
            state: Mutex::new(IterState {
                engine_iter: Some(engine_iter),
                first: true,
                finished: false,
                cache: VecDeque::new(),
                returned: 0,
            }),
            busy: AtomicBool::new(false),
            destroyed: AtomicBool::new(false),
        }
    }

    pub(crate) fn id(&self) -> IteratorId {
        self.id
    }

    fn acquire_busy(&self) -> CoreResult<BusyReset<'_>> {
        if self.destroyed.load(Ordering::Acquire) {
            return Err(CoreError::IteratorDestroyed {
                id: self.id.as_u64(),
            });
        }
        if self
            .busy
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Acquire)
            .is_err()
        {
            return Err(CoreError::IteratorBusy {
                id: self.id.as_u64(),
            });
        }
        Ok(BusyReset(&self.busy))
    }

    /// Repositions the cursor at `path` (relative to the level) and resets
    /// the batch state.
    pub(crate) fn seek(&self, path: &KeyPath) -> CoreResult<()> {
        let _busy = self.acquire_busy()?;
        let mut state = self.state.lock();

        let mut target = self.prefix.clone();
        target.extend(encode_key_path(path.parts()));
        state
            .engine_iter
            .as_mut()
            .ok_or(CoreError::IteratorDestroyed {
                id: self.id.as_u64(),
            })?
            .seek(&target)?;

        state.first = true;
        state.finished = false;
        state.cache.clear();
        Ok(())
    }

    /// Yields the next entry, batch-reading from the engine as needed.
    pub(crate) fn next_entry(&self) -> CoreResult<Option<Entry>> {
        let _busy = self.acquire_busy()?;
        let mut state = self.state.lock();

        if let Some(limit) = self.limit {
            if state.returned >= limit {
                state.finished = true;
                return Ok(None);
            }
        }

        loop {
            if let Some((key, value)) = state.cache.pop_front() {
                state.returned += 1;
                return self.decode_entry(key, value).map(Some);
            }
            if state.finished {
                return Ok(None);
            }

            let batch = if state.first { FIRST_BATCH } else { NEXT_BATCH };
            state.first = false;
            let iter = state
                .engine_iter
                .as_mut()
                .ok_or(CoreError::IteratorDestroyed {
                    id: self.id.as_u64(),
                })?;
            let (entries, finished) = iter.nextv(batch)?;
            state.finished = finished;
            state.cache.extend(entries);
        }
    }

    fn decode_entry(&self, key: Vec<u8>, value: Vec<u8>) -> CoreResult<Entry> {
        let key = if self.decode_keys {
            let relative = key.strip_prefix(self.prefix.as_slice()).unwrap_or(&key);
            Some(decode_key(relative)?)
        } else {
            None
        };
        let value = if self.decode_values {
            Some(unseal_value(self.crypto.as_ref(), &value)?)
        } else {
            None
        };
        Ok(Entry { key, value })
    }

    /// Closes the engine iterator and removes this iterator from its
    /// owner's registry. Idempotent.
    pub(crate) fn destroy(&self) -> CoreResult<()> {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        {
            let mut state = self.state.lock();
            state.cache.clear();
            if let Some(mut iter) = state.engine_iter.take() {
                iter.close()?;
            }
        }
        match &self.owner {
            IterOwner::Database(db) => {
                if let Some(db) = db.upgrade() {
                    db.remove_iterator(self.id);
                }
            }
            IterOwner::Transaction(txn) => {
                if let Some(txn) = txn.upgrade() {
                    txn.remove_iterator(self.id);
                }
            }
        }
        Ok(())
    }
}

/// A handle to an open iterator.
///
/// The iterator is destroyed when the handle drops; destruction is
/// idempotent, so calling [`destroy`](Self::destroy) first is fine.
pub struct DbIterator {
    pub(crate) inner: Arc<IteratorInner>,
}

impl DbIterator {
    /// Returns this iterator's id.
    #[must_use]
    pub fn id(&self) -> IteratorId {
        self.inner.id()
    }

    /// Repositions the cursor at `path`, relative to the iterated level.
    ///
    /// # Errors
    ///
    /// Fails with `IteratorBusy` while a `next` is in flight and with
    /// `IteratorDestroyed` after destruction.
    pub fn seek(&self, path: impl Into<KeyPath>) -> CoreResult<()> {
        self.inner.seek(&path.into())
    }

    /// Yields the next entry, or `None` once the range is exhausted.
    pub fn next_entry(&self) -> CoreResult<Option<Entry>> {
        self.inner.next_entry()
    }

    /// Drains all remaining entries, then destroys the iterator.
    pub fn collect_entries(self) -> CoreResult<Vec<Entry>> {
        let mut entries = Vec::new();
        while let Some(entry) = self.next_entry()? {
            entries.push(entry);
        }
        self.inner.destroy()?;
        Ok(entries)
    }

    /// Destroys the iterator. Idempotent.
    pub fn destroy(&self) -> CoreResult<()> {
        self.inner.destroy()
    }
}

impl Iterator for DbIterator {
    type Item = CoreResult<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_entry().transpose()
    }
}

impl Drop for DbIterator {
    fn drop(&mut self) {
        let _ = self.inner.destroy();
    }
}

impl std::fmt::Debug for DbIterator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbIterator").field("id", &self.id()).finish()
    }
}
