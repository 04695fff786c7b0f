//! Reference engine backed by an in-memory MVCC map.
//!
//! Every committed write group bumps a global sequence number and appends a
//! new version per key, so snapshots are just pinned sequence numbers and
//! reads walk a key's version chain backwards. When opened against a
//! directory the engine additionally journals committed groups to an
//! append-only log (see [`crate::log`]) and replays it at open, which gives
//! the durability profile of an LSM write-ahead log without the compaction
//! machinery.

use crate::engine::{
    BatchOp, Engine, EngineIterator, EngineSnapshot, EngineTransaction, Entry, KeyRange,
    SequenceNumber,
};
use crate::error::{EngineError, EngineResult};
use crate::log::Log;
use crate::options::EngineOptions;
use parking_lot::{Mutex, RwLock};
use std::any::Any;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::io;
use std::ops::Bound;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// File name of the persistence log inside the store directory.
const STORE_LOG_FILE: &str = "store.log";

/// Soft cap on bytes returned by a single `nextv` batch.
const BATCH_HIGH_WATERMARK: usize = 4 * 1024 * 1024;

/// One committed version of a key. `value == None` is a tombstone.
#[derive(Debug)]
struct Version {
    seq: SequenceNumber,
    value: Option<Vec<u8>>,
}

/// The versioned key space plus the committed sequence counter.
#[derive(Debug, Default)]
struct Store {
    versions: BTreeMap<Vec<u8>, Vec<Version>>,
    seq: SequenceNumber,
}

impl Store {
    /// Latest value of `key` visible at sequence `at`, if any.
    fn visible(&self, key: &[u8], at: SequenceNumber) -> Option<&Vec<u8>> {
        self.versions
            .get(key)
            .and_then(|chain| Self::visible_in(chain, at))
    }

    fn visible_in(chain: &[Version], at: SequenceNumber) -> Option<&Vec<u8>> {
        chain
            .iter()
            .rev()
            .find(|v| v.seq <= at)
            .and_then(|v| v.value.as_ref())
    }

    /// Sequence of the newest committed version of `key`,
    /// [`SequenceNumber::ZERO`] if never written.
    fn latest_seq(&self, key: &[u8]) -> SequenceNumber {
        self.versions
            .get(key)
            .and_then(|chain| chain.last())
            .map_or(SequenceNumber::ZERO, |v| v.seq)
    }

    /// Applies one committed group under the next sequence number.
    fn apply(&mut self, ops: &[BatchOp]) {
        self.seq = self.seq.next();
        let seq = self.seq;
        for op in ops {
            let (key, value) = match op {
                BatchOp::Put { key, value } => (key, Some(value.clone())),
                BatchOp::Del { key } => (key, None),
            };
            self.versions
                .entry(key.clone())
                .or_default()
                .push(Version { seq, value });
        }
    }
}

/// State shared between the engine handle and everything it hands out.
struct Shared {
    store: RwLock<Store>,
    log: Option<Mutex<Log>>,
    /// Ids of outstanding (unreleased) snapshots.
    snapshots: Mutex<HashSet<u64>>,
    next_snapshot_id: AtomicU64,
    closed: AtomicBool,
}

impl Shared {
    fn ensure_open(&self) -> EngineResult<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(EngineError::Closed)
        } else {
            Ok(())
        }
    }

    /// Journals and applies one committed write group.
    fn commit_group(&self, ops: Vec<BatchOp>, sync: bool) -> EngineResult<()> {
        self.ensure_open()?;
        let mut store = self.store.write();
        if let Some(log) = &self.log {
            log.lock().append(&ops, sync)?;
        }
        store.apply(&ops);
        Ok(())
    }

    /// Resolves an optional snapshot handle to a pinned sequence.
    fn snapshot_seq(
        &self,
        snapshot: Option<&dyn EngineSnapshot>,
    ) -> EngineResult<Option<SequenceNumber>> {
        let Some(snapshot) = snapshot else {
            return Ok(None);
        };
        let mem = snapshot
            .as_any()
            .downcast_ref::<MemSnapshot>()
            .ok_or(EngineError::ForeignSnapshot)?;
        if !self.snapshots.lock().contains(&mem.id) {
            return Err(EngineError::SnapshotReleased);
        }
        Ok(Some(mem.seq))
    }
}

/// A snapshot handle: a pinned sequence number with an identity.
#[derive(Debug)]
struct MemSnapshot {
    id: u64,
    seq: SequenceNumber,
}

impl EngineSnapshot for MemSnapshot {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// The reference engine.
///
/// Cloning is cheap; clones share the same store.
#[derive(Clone)]
pub struct MemoryEngine {
    shared: Arc<Shared>,
    options: EngineOptions,
}

impl MemoryEngine {
    /// Creates an ephemeral engine with no persistence.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            shared: Arc::new(Shared {
                store: RwLock::new(Store::default()),
                log: None,
                snapshots: Mutex::new(HashSet::new()),
                next_snapshot_id: AtomicU64::new(1),
                closed: AtomicBool::new(false),
            }),
            options: EngineOptions::default(),
        }
    }

    /// Opens a persistent store rooted at `path`.
    ///
    /// The directory is created when absent (unless `create_if_missing` is
    /// off) and the persistence log inside it is replayed into memory.
    pub fn open(path: &Path, options: EngineOptions) -> EngineResult<Self> {
        let log_path = path.join(STORE_LOG_FILE);

        if options.error_if_exists && log_path.exists() {
            return Err(EngineError::already_exists(log_path.display().to_string()));
        }
        if !path.exists() {
            if options.create_if_missing {
                std::fs::create_dir_all(path)?;
            } else {
                return Err(EngineError::Io(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("store directory does not exist: {}", path.display()),
                )));
            }
        }

        let (log, groups) = Log::open(&log_path)?;
        let mut store = Store::default();
        for group in &groups {
            store.apply(group);
        }
        debug!(
            path = %path.display(),
            groups = groups.len(),
            seq = %store.seq,
            "opened engine store"
        );

        Ok(Self {
            shared: Arc::new(Shared {
                store: RwLock::new(store),
                log: Some(Mutex::new(log)),
                snapshots: Mutex::new(HashSet::new()),
                next_snapshot_id: AtomicU64::new(1),
                closed: AtomicBool::new(false),
            }),
            options,
        })
    }

    /// Returns the options the engine was opened with.
    #[must_use]
    pub fn options(&self) -> &EngineOptions {
        &self.options
    }
}

impl Engine for MemoryEngine {
    fn get(
        &self,
        key: &[u8],
        snapshot: Option<&dyn EngineSnapshot>,
    ) -> EngineResult<Option<Vec<u8>>> {
        self.shared.ensure_open()?;
        let at = self.shared.snapshot_seq(snapshot)?;
        let store = self.shared.store.read();
        let at = at.unwrap_or(store.seq);
        Ok(store.visible(key, at).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8], sync: bool) -> EngineResult<()> {
        self.shared.commit_group(
            vec![BatchOp::Put {
                key: key.to_vec(),
                value: value.to_vec(),
            }],
            sync,
        )
    }

    fn del(&self, key: &[u8], sync: bool) -> EngineResult<()> {
        self.shared
            .commit_group(vec![BatchOp::Del { key: key.to_vec() }], sync)
    }

    fn batch(&self, ops: Vec<BatchOp>, sync: bool) -> EngineResult<()> {
        if ops.is_empty() {
            return self.shared.ensure_open();
        }
        self.shared.commit_group(ops, sync)
    }

    fn clear(
        &self,
        range: &KeyRange,
        snapshot: Option<&dyn EngineSnapshot>,
        sync: bool,
    ) -> EngineResult<()> {
        self.shared.ensure_open()?;
        let at = self.shared.snapshot_seq(snapshot)?;
        let keys: Vec<Vec<u8>> = {
            let store = self.shared.store.read();
            let at = at.unwrap_or(store.seq);
            store
                .versions
                .iter()
                .filter(|(key, chain)| {
                    range.contains(key) && Store::visible_in(chain, at).is_some()
                })
                .map(|(key, _)| key.clone())
                .collect()
        };
        if keys.is_empty() {
            return Ok(());
        }
        let ops = keys.into_iter().map(|key| BatchOp::Del { key }).collect();
        self.shared.commit_group(ops, sync)
    }

    fn iterator(
        &self,
        range: KeyRange,
        reverse: bool,
        snapshot: Option<&dyn EngineSnapshot>,
    ) -> EngineResult<Box<dyn EngineIterator>> {
        self.shared.ensure_open()?;
        let at = self.shared.snapshot_seq(snapshot)?;
        let seq = at.unwrap_or_else(|| self.shared.store.read().seq);
        Ok(Box::new(MemIterator {
            shared: Arc::clone(&self.shared),
            overlay: None,
            seq,
            range,
            reverse,
            cursor: Bound::Unbounded,
            closed: false,
        }))
    }

    fn snapshot(&self) -> EngineResult<Arc<dyn EngineSnapshot>> {
        self.shared.ensure_open()?;
        let seq = self.shared.store.read().seq;
        let id = self.shared.next_snapshot_id.fetch_add(1, Ordering::Relaxed);
        self.shared.snapshots.lock().insert(id);
        Ok(Arc::new(MemSnapshot { id, seq }))
    }

    fn release_snapshot(&self, snapshot: &dyn EngineSnapshot) -> EngineResult<()> {
        let mem = snapshot
            .as_any()
            .downcast_ref::<MemSnapshot>()
            .ok_or(EngineError::ForeignSnapshot)?;
        if !self.shared.snapshots.lock().remove(&mem.id) {
            return Err(EngineError::SnapshotReleased);
        }
        Ok(())
    }

    fn transaction(&self, sync: bool) -> EngineResult<Box<dyn EngineTransaction>> {
        self.shared.ensure_open()?;
        Ok(Box::new(MemTransaction {
            shared: Arc::clone(&self.shared),
            state: Arc::new(Mutex::new(TxnState::default())),
            sync,
        }))
    }

    fn close(&self) -> EngineResult<()> {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        if let Some(log) = &self.shared.log {
            log.lock().sync()?;
        }
        debug!("engine closed");
        Ok(())
    }
}

/// Uncommitted transaction state, shared with the transaction's iterators.
#[derive(Debug, Default)]
struct TxnState {
    /// Pending writes; `None` marks a staged delete.
    overlay: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
    /// Conflict-tracked keys mapped to the sequence they were observed at.
    tracked: HashMap<Vec<u8>, SequenceNumber>,
    snapshot_seq: Option<SequenceNumber>,
    finished: bool,
}

struct MemTransaction {
    shared: Arc<Shared>,
    state: Arc<Mutex<TxnState>>,
    sync: bool,
}

impl MemTransaction {
    fn ensure_active(&self) -> EngineResult<()> {
        self.shared.ensure_open()?;
        if self.state.lock().finished {
            return Err(EngineError::TransactionFinished);
        }
        Ok(())
    }

    /// Records `key` for conflict detection if it isn't tracked yet.
    ///
    /// Keys observed under a snapshot conflict when modified after the
    /// snapshot point; keys touched before any snapshot conflict when
    /// modified after the touch.
    fn track(state: &mut TxnState, store: &Store, key: &[u8]) {
        let observed = state.snapshot_seq.unwrap_or_else(|| store.latest_seq(key));
        state.tracked.entry(key.to_vec()).or_insert(observed);
    }

    fn read(&self, key: &[u8], for_update: bool) -> EngineResult<Option<Vec<u8>>> {
        self.ensure_active()?;
        let mut state = self.state.lock();
        if for_update && state.snapshot_seq.is_none() {
            state.snapshot_seq = Some(self.shared.store.read().seq);
        }
        if let Some(staged) = state.overlay.get(key) {
            return Ok(staged.clone());
        }
        let store = self.shared.store.read();
        if for_update {
            Self::track(&mut state, &store, key);
        }
        let at = state.snapshot_seq.unwrap_or(store.seq);
        Ok(store.visible(key, at).cloned())
    }
}

impl EngineTransaction for MemTransaction {
    fn get(&mut self, key: &[u8]) -> EngineResult<Option<Vec<u8>>> {
        self.read(key, false)
    }

    fn get_for_update(&mut self, key: &[u8]) -> EngineResult<Option<Vec<u8>>> {
        self.read(key, true)
    }

    fn multi_get(&mut self, keys: &[Vec<u8>]) -> EngineResult<Vec<Option<Vec<u8>>>> {
        keys.iter().map(|key| self.read(key, false)).collect()
    }

    fn multi_get_for_update(&mut self, keys: &[Vec<u8>]) -> EngineResult<Vec<Option<Vec<u8>>>> {
        keys.iter().map(|key| self.read(key, true)).collect()
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> EngineResult<()> {
        self.ensure_active()?;
        let mut state = self.state.lock();
        let store = self.shared.store.read();
        Self::track(&mut state, &store, key);
        drop(store);
        state.overlay.insert(key.to_vec(), Some(value.to_vec()));
        Ok(())
    }

    fn del(&mut self, key: &[u8]) -> EngineResult<()> {
        self.ensure_active()?;
        let mut state = self.state.lock();
        let store = self.shared.store.read();
        Self::track(&mut state, &store, key);
        drop(store);
        state.overlay.insert(key.to_vec(), None);
        Ok(())
    }

    fn clear(&mut self, range: &KeyRange) -> EngineResult<()> {
        self.ensure_active()?;
        let mut state = self.state.lock();
        let store = self.shared.store.read();
        let at = state.snapshot_seq.unwrap_or(store.seq);

        let mut doomed: Vec<Vec<u8>> = store
            .versions
            .iter()
            .filter(|(key, chain)| range.contains(key) && Store::visible_in(chain, at).is_some())
            .map(|(key, _)| key.clone())
            .collect();
        doomed.extend(
            state
                .overlay
                .iter()
                .filter(|(key, staged)| range.contains(key) && staged.is_some())
                .map(|(key, _)| key.clone()),
        );

        for key in doomed {
            Self::track(&mut state, &store, &key);
            state.overlay.insert(key, None);
        }
        Ok(())
    }

    fn iterator(&mut self, range: KeyRange, reverse: bool) -> EngineResult<Box<dyn EngineIterator>> {
        self.ensure_active()?;
        let state = self.state.lock();
        let seq = state
            .snapshot_seq
            .unwrap_or_else(|| self.shared.store.read().seq);
        drop(state);
        Ok(Box::new(MemIterator {
            shared: Arc::clone(&self.shared),
            overlay: Some(Arc::clone(&self.state)),
            seq,
            range,
            reverse,
            cursor: Bound::Unbounded,
            closed: false,
        }))
    }

    fn set_snapshot(&mut self) -> EngineResult<()> {
        self.ensure_active()?;
        let mut state = self.state.lock();
        if state.snapshot_seq.is_none() {
            state.snapshot_seq = Some(self.shared.store.read().seq);
        }
        Ok(())
    }

    fn has_snapshot(&self) -> bool {
        self.state.lock().snapshot_seq.is_some()
    }

    fn commit(&mut self) -> EngineResult<()> {
        self.shared.ensure_open()?;
        let mut state = self.state.lock();
        if state.finished {
            return Err(EngineError::TransactionFinished);
        }
        state.finished = true;

        let mut store = self.shared.store.write();
        for (key, observed) in &state.tracked {
            if store.latest_seq(key) > *observed {
                return Err(EngineError::Conflict);
            }
        }

        if state.overlay.is_empty() {
            return Ok(());
        }
        let ops: Vec<BatchOp> = state
            .overlay
            .iter()
            .map(|(key, staged)| match staged {
                Some(value) => BatchOp::Put {
                    key: key.clone(),
                    value: value.clone(),
                },
                None => BatchOp::Del { key: key.clone() },
            })
            .collect();
        if let Some(log) = &self.shared.log {
            log.lock().append(&ops, self.sync)?;
        }
        store.apply(&ops);
        Ok(())
    }

    fn rollback(&mut self) -> EngineResult<()> {
        let mut state = self.state.lock();
        if state.finished {
            return Err(EngineError::TransactionFinished);
        }
        state.finished = true;
        state.overlay.clear();
        state.tracked.clear();
        Ok(())
    }
}

/// Batched cursor over the store, optionally merged with a live overlay.
///
/// The base view is frozen at `seq`; the overlay (when present) is read live
/// on every batch so a transaction's own later writes remain visible.
struct MemIterator {
    shared: Arc<Shared>,
    overlay: Option<Arc<Mutex<TxnState>>>,
    seq: SequenceNumber,
    range: KeyRange,
    reverse: bool,
    /// Resume position: a lower bound going forward, an upper in reverse.
    cursor: Bound<Vec<u8>>,
    closed: bool,
}

impl MemIterator {
    fn bounds(&self) -> (Bound<Vec<u8>>, Bound<Vec<u8>>) {
        let mut lower = Bound::Unbounded;
        let mut upper = Bound::Unbounded;
        if let Some(gte) = &self.range.gte {
            lower = tighten_lower(lower, Bound::Included(gte.clone()));
        }
        if let Some(gt) = &self.range.gt {
            lower = tighten_lower(lower, Bound::Excluded(gt.clone()));
        }
        if let Some(lte) = &self.range.lte {
            upper = tighten_upper(upper, Bound::Included(lte.clone()));
        }
        if let Some(lt) = &self.range.lt {
            upper = tighten_upper(upper, Bound::Excluded(lt.clone()));
        }
        if self.reverse {
            upper = tighten_upper(upper, self.cursor.clone());
        } else {
            lower = tighten_lower(lower, self.cursor.clone());
        }
        (lower, upper)
    }
}

/// True when no key can satisfy both bounds; also covers the combinations
/// `BTreeMap::range` would panic on.
fn empty_bounds(lower: &Bound<Vec<u8>>, upper: &Bound<Vec<u8>>) -> bool {
    use Bound::{Excluded, Included, Unbounded};
    match (lower, upper) {
        (Unbounded, _) | (_, Unbounded) => false,
        (Included(l), Included(u)) => l > u,
        (Included(l), Excluded(u)) | (Excluded(l), Included(u)) | (Excluded(l), Excluded(u)) => {
            l >= u
        }
    }
}

fn tighten_lower(a: Bound<Vec<u8>>, b: Bound<Vec<u8>>) -> Bound<Vec<u8>> {
    use Bound::{Excluded, Included, Unbounded};
    match (a, b) {
        (Unbounded, b) => b,
        (a, Unbounded) => a,
        (Included(x), Included(y)) => Included(x.max(y)),
        (Excluded(x), Excluded(y)) => Excluded(x.max(y)),
        (Included(i), Excluded(e)) | (Excluded(e), Included(i)) => {
            if e >= i {
                Excluded(e)
            } else {
                Included(i)
            }
        }
    }
}

fn tighten_upper(a: Bound<Vec<u8>>, b: Bound<Vec<u8>>) -> Bound<Vec<u8>> {
    use Bound::{Excluded, Included, Unbounded};
    match (a, b) {
        (Unbounded, b) => b,
        (a, Unbounded) => a,
        (Included(x), Included(y)) => Included(x.min(y)),
        (Excluded(x), Excluded(y)) => Excluded(x.min(y)),
        (Included(i), Excluded(e)) | (Excluded(e), Included(i)) => {
            if e <= i {
                Excluded(e)
            } else {
                Included(i)
            }
        }
    }
}

impl EngineIterator for MemIterator {
    fn seek(&mut self, key: &[u8]) -> EngineResult<()> {
        if self.closed {
            return Err(EngineError::IteratorClosed);
        }
        self.cursor = Bound::Included(key.to_vec());
        Ok(())
    }

    fn nextv(&mut self, count: usize) -> EngineResult<(Vec<Entry>, bool)> {
        if self.closed {
            return Err(EngineError::IteratorClosed);
        }
        self.shared.ensure_open()?;
        if count == 0 {
            return Ok((Vec::new(), false));
        }

        let bounds = self.bounds();
        if empty_bounds(&bounds.0, &bounds.1) {
            return Ok((Vec::new(), true));
        }

        // Lock order matches the transaction paths: state first, store second.
        let overlay_guard = self.overlay.as_ref().map(|state| state.lock());
        let store = self.shared.store.read();
        let seq = self.seq;

        // Base view frozen at `seq`, as (key, live value) pairs.
        let base = store
            .versions
            .range::<Vec<u8>, _>((bounds.0.clone(), bounds.1.clone()))
            .filter_map(move |(key, chain)| Store::visible_in(chain, seq).map(|v| (key, Some(v))));
        let mut base: Box<dyn Iterator<Item = (&Vec<u8>, Option<&Vec<u8>>)> + '_> = if self.reverse {
            Box::new(base.rev())
        } else {
            Box::new(base)
        };

        // Live overlay; tombstones shadow base entries.
        let mut ovl: Box<dyn Iterator<Item = (&Vec<u8>, Option<&Vec<u8>>)> + '_> = match &overlay_guard {
            Some(state) => {
                let iter = state
                    .overlay
                    .range::<Vec<u8>, _>((bounds.0.clone(), bounds.1.clone()))
                    .map(|(key, staged)| (key, staged.as_ref()));
                if self.reverse {
                    Box::new(iter.rev())
                } else {
                    Box::new(iter)
                }
            }
            None => Box::new(std::iter::empty()),
        };

        let mut out: Vec<Entry> = Vec::new();
        let mut bytes = 0usize;
        let mut finished = true;
        let mut next_base = base.next();
        let mut next_ovl = ovl.next();

        loop {
            // Pick the next key in iteration order; the overlay wins ties.
            let from_overlay = match (&next_base, &next_ovl) {
                (None, None) => break,
                (Some(_), None) => false,
                (None, Some(_)) => true,
                (Some((bk, _)), Some((ok, _))) => {
                    if self.reverse {
                        ok >= bk
                    } else {
                        ok <= bk
                    }
                }
            };
            let (key, value) = if from_overlay {
                let Some((ok, ov)) = next_ovl.take() else { break };
                if let Some((bk, _)) = &next_base {
                    if *bk == ok {
                        next_base = base.next();
                    }
                }
                next_ovl = ovl.next();
                (ok, ov)
            } else {
                let Some((bk, bv)) = next_base.take() else { break };
                next_base = base.next();
                (bk, bv)
            };

            let Some(value) = value else {
                continue; // staged delete
            };
            out.push((key.clone(), value.clone()));
            bytes += key.len() + value.len();
            if out.len() >= count || bytes >= BATCH_HIGH_WATERMARK {
                finished = next_base.is_none() && next_ovl.is_none();
                break;
            }
        }

        if let Some((key, _)) = out.last() {
            self.cursor = Bound::Excluded(key.clone());
        }

        Ok((out, finished))
    }

    fn close(&mut self) -> EngineResult<()> {
        self.closed = true;
        Ok(())
    }
}
