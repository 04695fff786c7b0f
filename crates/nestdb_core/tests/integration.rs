//! End-to-end tests for the database, transactions, and iterators.

use nestdb_core::{
    ClearOptions, CoreError, Crypto, Database, DatabaseOptions, EncryptionKey, IteratorOptions,
    KeyPath, LockMode, WriteOp,
};
use nestdb_engine::{
    BatchOp, Engine, EngineIterator, EngineResult, EngineSnapshot, EngineTransaction, Entry,
    KeyRange, MemoryEngine,
};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use tempfile::tempdir;

fn open_plain(path: &std::path::Path) -> Database {
    Database::open(path, DatabaseOptions::default()).unwrap()
}

#[test]
fn put_get_del_roundtrip() {
    let dir = tempdir().unwrap();
    let db = open_plain(dir.path());

    db.put(["users", "alice"], &json!({"age": 30}), false).unwrap();
    assert_eq!(
        db.get(["users", "alice"]).unwrap(),
        Some(json!({"age": 30}))
    );

    db.del(["users", "alice"], false).unwrap();
    assert_eq!(db.get(["users", "alice"]).unwrap(), None);

    db.stop().unwrap();
}

#[test]
fn raw_values_roundtrip() {
    let dir = tempdir().unwrap();
    let db = open_plain(dir.path());

    db.put_raw(["blob"], &[0xDE, 0xAD, 0x00, 0xEF], false).unwrap();
    assert_eq!(
        db.get_raw(["blob"]).unwrap(),
        Some(vec![0xDE, 0xAD, 0x00, 0xEF])
    );

    db.stop().unwrap();
}

#[test]
fn empty_path_normalization() {
    let dir = tempdir().unwrap();
    let db = open_plain(dir.path());

    db.put(KeyPath::new(), &json!("v"), false).unwrap();
    assert_eq!(db.get(KeyPath::new()).unwrap(), Some(json!("v")));

    let dump = db.dump(KeyPath::new(), false).unwrap();
    assert!(dump.contains(&(KeyPath::from([""]), json!("v"))));

    db.stop().unwrap();
}

#[test]
fn separator_bytes_in_components() {
    let dir = tempdir().unwrap();
    let db = open_plain(dir.path());

    let path = KeyPath::from([b"\x00\x01level".to_vec(), b"key".to_vec()]);
    db.put(path.clone(), &json!("v"), false).unwrap();
    assert_eq!(db.get(path.clone()).unwrap(), Some(json!("v")));

    // The weird level really is a level: it shows up in iteration under it.
    let entries = db
        .iterator([b"\x00\x01level".to_vec()], IteratorOptions::default())
        .unwrap()
        .collect_entries()
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].key.as_ref().unwrap(), &KeyPath::from(["key"]));

    db.stop().unwrap();
}

#[test]
fn durability_across_restart() {
    let dir = tempdir().unwrap();
    {
        let db = open_plain(dir.path());
        db.put(["persisted"], &json!(42), false).unwrap();
        db.stop().unwrap();
    }
    {
        let db = open_plain(dir.path());
        assert_eq!(db.get(["persisted"]).unwrap(), Some(json!(42)));
        db.stop().unwrap();
    }
}

#[test]
fn batch_writes_are_atomic_and_prefixed() {
    let dir = tempdir().unwrap();
    let db = open_plain(dir.path());

    db.batch(
        vec![
            WriteOp::put(["a"], &json!(1)).unwrap(),
            WriteOp::put_raw(["b"], b"raw".to_vec()),
            WriteOp::del(["a"]),
        ],
        false,
    )
    .unwrap();

    assert_eq!(db.get(["a"]).unwrap(), None);
    assert_eq!(db.get_raw(["b"]).unwrap(), Some(b"raw".to_vec()));

    db.stop().unwrap();
}

#[test]
fn clear_of_sublevel_leaves_siblings() {
    let dir = tempdir().unwrap();
    let db = open_plain(dir.path());

    db.put(KeyPath::new(), &json!("v0"), false).unwrap();
    db.put(["a"], &json!("v1"), false).unwrap();
    db.put(["", "a"], &json!("v2"), false).unwrap();
    db.put(["a", ""], &json!("v3"), false).unwrap();
    db.put(["level1", ""], &json!("v5"), false).unwrap();
    db.put(["level1", "a"], &json!("v6"), false).unwrap();
    db.put(["level1", "level2", "a"], &json!("v8"), false).unwrap();

    db.clear(["level1"], &ClearOptions::default()).unwrap();

    assert_eq!(db.get(KeyPath::new()).unwrap(), Some(json!("v0")));
    assert_eq!(db.get(["a"]).unwrap(), Some(json!("v1")));
    assert_eq!(db.get(["", "a"]).unwrap(), Some(json!("v2")));
    assert_eq!(db.get(["a", ""]).unwrap(), Some(json!("v3")));
    assert_eq!(db.get(["level1", ""]).unwrap(), None);
    assert_eq!(db.get(["level1", "a"]).unwrap(), None);
    assert_eq!(db.get(["level1", "level2", "a"]).unwrap(), None);

    assert_eq!(db.count(["level1"], IteratorOptions::default()).unwrap(), 0);
    assert_eq!(
        db.count(KeyPath::new(), IteratorOptions::default()).unwrap(),
        4
    );

    db.stop().unwrap();
}

#[test]
fn iterator_yields_level_relative_keys_in_order() {
    let dir = tempdir().unwrap();
    let db = open_plain(dir.path());

    db.put(["users", "alice"], &json!(1), false).unwrap();
    db.put(["users", "bob"], &json!(2), false).unwrap();
    db.put(["groups", "admin"], &json!(3), false).unwrap();

    let entries = db
        .iterator(["users"], IteratorOptions::default())
        .unwrap()
        .collect_entries()
        .unwrap();

    let keys: Vec<_> = entries
        .iter()
        .map(|entry| entry.key.clone().unwrap())
        .collect();
    assert_eq!(keys, vec![KeyPath::from(["alice"]), KeyPath::from(["bob"])]);

    db.stop().unwrap();
}

#[test]
fn iterator_options_limit_reverse_bounds() {
    let dir = tempdir().unwrap();
    let db = open_plain(dir.path());

    for key in ["a", "b", "c", "d"] {
        db.put([key], &json!(key), false).unwrap();
    }

    let reversed = db
        .iterator(KeyPath::new(), IteratorOptions::new().reverse(true).limit(2))
        .unwrap()
        .collect_entries()
        .unwrap();
    let keys: Vec<_> = reversed
        .iter()
        .map(|entry| entry.key.clone().unwrap())
        .collect();
    assert_eq!(keys, vec![KeyPath::from(["d"]), KeyPath::from(["c"])]);

    let bounded = db
        .iterator(
            KeyPath::new(),
            IteratorOptions::new().gte(["b"]).lt(["d"]),
        )
        .unwrap()
        .collect_entries()
        .unwrap();
    let keys: Vec<_> = bounded
        .iter()
        .map(|entry| entry.key.clone().unwrap())
        .collect();
    assert_eq!(keys, vec![KeyPath::from(["b"]), KeyPath::from(["c"])]);

    db.stop().unwrap();
}

#[test]
fn destroyed_iterator_rejects_use() {
    let dir = tempdir().unwrap();
    let db = open_plain(dir.path());
    db.put(["k"], &json!(1), false).unwrap();

    let iter = db.iterator(KeyPath::new(), IteratorOptions::default()).unwrap();
    iter.destroy().unwrap();
    iter.destroy().unwrap(); // idempotent
    assert!(matches!(
        iter.next_entry(),
        Err(CoreError::IteratorDestroyed { .. })
    ));

    db.stop().unwrap();
}

#[test]
fn dump_root_exposes_reserved_namespaces() {
    let dir = tempdir().unwrap();
    let crypto = Crypto::aes256gcm(EncryptionKey::generate());
    let db = Database::open(
        dir.path(),
        DatabaseOptions::default().crypto(crypto),
    )
    .unwrap();

    db.put(["k"], &json!("v"), false).unwrap();

    // Data-relative dump hides the canary.
    let dump = db.dump(KeyPath::new(), false).unwrap();
    assert_eq!(dump, vec![(KeyPath::from(["k"]), json!("v"))]);

    // Root dump exposes it, after the data namespace.
    let root_dump = db.dump(KeyPath::new(), true).unwrap();
    assert_eq!(
        root_dump,
        vec![
            (KeyPath::from(["data", "k"]), json!("v")),
            (KeyPath::from(["canary"]), json!("deadbeef")),
        ]
    );

    db.stop().unwrap();
}

#[test]
fn encrypted_values_are_ciphertext_on_disk() {
    let dir = tempdir().unwrap();
    let crypto = Crypto::aes256gcm(EncryptionKey::generate());
    let db = Database::open(dir.path(), DatabaseOptions::default().crypto(crypto)).unwrap();

    db.put(["secret"], &json!("plaintext-value"), true).unwrap();
    assert_eq!(db.get(["secret"]).unwrap(), Some(json!("plaintext-value")));
    db.stop().unwrap();

    let log = std::fs::read(dir.path().join("store.log")).unwrap();
    let needle = b"plaintext-value";
    assert!(!log
        .windows(needle.len())
        .any(|window| window == needle));
}

#[test]
fn canary_rejects_wrong_key() {
    let dir = tempdir().unwrap();
    let key1 = EncryptionKey::generate();
    let key2 = EncryptionKey::generate();

    {
        let db = Database::open(
            dir.path(),
            DatabaseOptions::default().crypto(Crypto::aes256gcm(key1.clone())),
        )
        .unwrap();
        db.put(["k"], &json!(1), false).unwrap();
        db.stop().unwrap();
    }

    let result = Database::open(
        dir.path(),
        DatabaseOptions::default().crypto(Crypto::aes256gcm(key2)),
    );
    assert!(matches!(result, Err(CoreError::Key { .. })));

    // The failed open released the engine; the right key still works.
    let db = Database::open(
        dir.path(),
        DatabaseOptions::default().crypto(Crypto::aes256gcm(key1)),
    )
    .unwrap();
    assert_eq!(db.get(["k"]).unwrap(), Some(json!(1)));
    db.stop().unwrap();
}

#[test]
fn fresh_deletes_existing_data() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("db");

    {
        let db = open_plain(&path);
        db.put(["k"], &json!(1), false).unwrap();
        db.stop().unwrap();
    }
    {
        let db = Database::open(&path, DatabaseOptions::default().fresh(true)).unwrap();
        assert_eq!(db.get(["k"]).unwrap(), None);
        db.stop().unwrap();
    }
}

#[test]
fn second_open_fails_while_running() {
    let dir = tempdir().unwrap();
    let db = open_plain(dir.path());

    let result = Database::open(dir.path(), DatabaseOptions::default());
    assert!(matches!(result, Err(CoreError::Running)));

    db.stop().unwrap();
}

#[test]
fn transaction_commit_is_atomic() {
    let dir = tempdir().unwrap();
    let db = open_plain(dir.path());

    let txn = db.transaction().unwrap();
    txn.put(["a"], &json!(1)).unwrap();
    txn.put(["b"], &json!(2)).unwrap();

    // Nothing is observable from outside before commit.
    assert_eq!(db.get(["a"]).unwrap(), None);
    assert_eq!(db.get(["b"]).unwrap(), None);

    txn.commit().unwrap();
    assert_eq!(db.get(["a"]).unwrap(), Some(json!(1)));
    assert_eq!(db.get(["b"]).unwrap(), Some(json!(2)));

    db.stop().unwrap();
}

#[test]
fn transaction_terminal_states_are_exclusive() {
    let dir = tempdir().unwrap();
    let db = open_plain(dir.path());

    let txn = db.transaction().unwrap();
    txn.put(["k"], &json!(1)).unwrap();
    txn.commit().unwrap();
    txn.commit().unwrap(); // idempotent
    assert!(matches!(
        txn.rollback(),
        Err(CoreError::TransactionCommitted { .. })
    ));
    assert!(matches!(
        txn.put(["k"], &json!(2)),
        Err(CoreError::TransactionDestroyed { .. })
    ));

    let txn = db.transaction().unwrap();
    txn.rollback().unwrap();
    txn.rollback().unwrap(); // idempotent
    assert!(matches!(
        txn.commit(),
        Err(CoreError::TransactionRollbacked { .. })
    ));

    db.stop().unwrap();
}

#[test]
fn write_skew_prevented_by_get_for_update() {
    let dir = tempdir().unwrap();
    let db = open_plain(dir.path());

    db.put(["balance1"], &json!(100), false).unwrap();
    db.put(["balance2"], &json!(100), false).unwrap();

    let txn1 = db.transaction().unwrap();
    let txn2 = db.transaction().unwrap();

    let paths = [KeyPath::from(["balance1"]), KeyPath::from(["balance2"])];
    let read1 = txn1.multi_get_for_update(&paths).unwrap();
    let read2 = txn2.multi_get_for_update(&paths).unwrap();
    assert_eq!(read1, vec![Some(json!(100)), Some(json!(100))]);
    assert_eq!(read2, vec![Some(json!(100)), Some(json!(100))]);

    // Each debits a different balance; the combined invariant would break.
    txn1.put(["balance1"], &json!(0)).unwrap();
    txn2.put(["balance2"], &json!(0)).unwrap();

    txn1.commit().unwrap();
    assert!(matches!(
        txn2.commit(),
        Err(CoreError::TransactionConflict { .. })
    ));

    assert_eq!(db.get(["balance1"]).unwrap(), Some(json!(0)));
    assert_eq!(db.get(["balance2"]).unwrap(), Some(json!(100)));

    db.stop().unwrap();
}

#[test]
fn snapshot_repeatable_read_with_own_writes_visible() {
    let dir = tempdir().unwrap();
    let db = open_plain(dir.path());

    db.put(["K1"], &json!(100), false).unwrap();
    db.put(["K2"], &json!(100), false).unwrap();

    let txn = db.transaction().unwrap();
    txn.set_snapshot().unwrap();

    // External writer updates both keys after the snapshot.
    db.put(["K1"], &json!(200), false).unwrap();
    db.put(["K2"], &json!(200), false).unwrap();

    assert_eq!(txn.get(["K1"]).unwrap(), Some(json!(100)));
    assert_eq!(txn.get(["K2"]).unwrap(), Some(json!(100)));

    // The transaction's own write shadows the snapshot for its iterator.
    txn.put(["K1"], &json!(300)).unwrap();
    let entries = txn
        .iterator(KeyPath::new(), IteratorOptions::default())
        .unwrap()
        .collect_entries()
        .unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].key.as_ref().unwrap(), &KeyPath::from(["K1"]));
    assert_eq!(entries[0].json().unwrap(), Some(json!(300)));
    assert_eq!(entries[1].json().unwrap(), Some(json!(100)));

    txn.rollback().unwrap();
    db.stop().unwrap();
}

#[test]
fn database_snapshot_pins_iteration() {
    let dir = tempdir().unwrap();
    let db = open_plain(dir.path());

    db.put(["k"], &json!("old"), false).unwrap();
    let snapshot = db.snapshot().unwrap();
    db.put(["k"], &json!("new"), false).unwrap();

    let entries = db
        .iterator(
            KeyPath::new(),
            IteratorOptions::new().snapshot(snapshot.clone()),
        )
        .unwrap()
        .collect_entries()
        .unwrap();
    assert_eq!(entries[0].json().unwrap(), Some(json!("old")));

    snapshot.release().unwrap();
    snapshot.release().unwrap(); // idempotent

    db.stop().unwrap();
}

#[test]
fn dangling_transaction_rolled_back_on_stop() {
    let dir = tempdir().unwrap();
    let db = open_plain(dir.path());

    let txn = db.transaction().unwrap();
    txn.put(["k"], &json!("staged")).unwrap();
    db.stop().unwrap();

    // The release path now reports the rollback performed by stop.
    assert!(txn.is_rollbacked());
    assert!(matches!(
        txn.commit(),
        Err(CoreError::TransactionRollbacked { .. })
    ));
}

#[test]
fn transaction_clear_and_count() {
    let dir = tempdir().unwrap();
    let db = open_plain(dir.path());

    db.put(["level", "a"], &json!(1), false).unwrap();
    db.put(["level", "b"], &json!(2), false).unwrap();
    db.put(["other"], &json!(3), false).unwrap();

    let txn = db.transaction().unwrap();
    assert_eq!(txn.count(["level"], IteratorOptions::default()).unwrap(), 2);

    txn.clear(["level"], &ClearOptions::default()).unwrap();
    assert_eq!(txn.count(["level"], IteratorOptions::default()).unwrap(), 0);

    // Overlay only: the database still sees both until commit.
    assert_eq!(db.count(["level"], IteratorOptions::default()).unwrap(), 2);

    txn.commit().unwrap();
    assert_eq!(db.count(["level"], IteratorOptions::default()).unwrap(), 0);
    assert_eq!(db.get(["other"]).unwrap(), Some(json!(3)));

    db.stop().unwrap();
}

#[test]
fn with_transaction_commits_on_ok_and_rolls_back_on_err() {
    let dir = tempdir().unwrap();
    let db = open_plain(dir.path());

    db.with_transaction(|txn| {
        txn.put(["committed"], &json!(true))?;
        Ok(())
    })
    .unwrap();
    assert_eq!(db.get(["committed"]).unwrap(), Some(json!(true)));

    let result: Result<(), _> = db.with_transaction(|txn| {
        txn.put(["rolled-back"], &json!(true))?;
        Err(CoreError::key("boom"))
    });
    assert!(matches!(result, Err(CoreError::Key { .. })));
    assert_eq!(db.get(["rolled-back"]).unwrap(), None);

    db.stop().unwrap();
}

#[test]
fn with_transaction_surfaces_conflicts() {
    let dir = tempdir().unwrap();
    let db = open_plain(dir.path());
    db.put(["k"], &json!(1), false).unwrap();

    let outside = db.transaction().unwrap();
    outside.put(["k"], &json!(2)).unwrap();

    let result: Result<(), _> = db.with_transaction(|txn| {
        txn.get_for_update(["k"])?;
        outside.commit()?;
        txn.put(["k"], &json!(3))?;
        Ok(())
    });
    assert!(matches!(result, Err(CoreError::TransactionConflict { .. })));
    assert_eq!(db.get(["k"]).unwrap(), Some(json!(2)));

    db.stop().unwrap();
}

#[test]
fn transaction_locks_reentrancy_and_release() {
    let dir = tempdir().unwrap();
    let db = open_plain(dir.path());

    let txn1 = db.transaction().unwrap();
    txn1.lock(["resource"]).unwrap();
    txn1.lock(["resource"]).unwrap(); // same mode: no-op
    assert!(matches!(
        txn1.lock([("resource", LockMode::Read)]),
        Err(CoreError::TransactionLockType { .. })
    ));

    // Destroy releases held locks, letting the next transaction acquire.
    txn1.put(["k"], &json!(1)).unwrap();
    txn1.commit().unwrap();

    let txn2 = db.transaction().unwrap();
    txn2.lock(["resource"]).unwrap();
    txn2.unlock(["resource"]).unwrap();
    txn2.rollback().unwrap();

    db.stop().unwrap();
}

#[test]
fn callback_queues_run_in_phase_order() {
    let dir = tempdir().unwrap();
    let db = open_plain(dir.path());
    let events: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

    let txn = db.transaction().unwrap();
    txn.put(["k"], &json!(1)).unwrap();
    {
        let events = Arc::clone(&events);
        txn.queue_success(move || {
            events.lock().push("success1");
            Ok(())
        })
        .unwrap();
    }
    {
        let events = Arc::clone(&events);
        txn.queue_success(move || {
            events.lock().push("success2");
            Ok(())
        })
        .unwrap();
    }
    {
        let events = Arc::clone(&events);
        txn.queue_failure(move |_| {
            events.lock().push("failure");
            Ok(())
        })
        .unwrap();
    }
    {
        let events = Arc::clone(&events);
        txn.queue_finally(move || {
            events.lock().push("finally");
            Ok(())
        })
        .unwrap();
    }
    txn.commit().unwrap();
    assert_eq!(*events.lock(), vec!["success1", "success2", "finally"]);

    events.lock().clear();
    let txn = db.transaction().unwrap();
    {
        let events = Arc::clone(&events);
        txn.queue_success(move || {
            events.lock().push("success");
            Ok(())
        })
        .unwrap();
    }
    {
        let events = Arc::clone(&events);
        txn.queue_failure(move |error| {
            assert!(error.is_none());
            events.lock().push("failure");
            Ok(())
        })
        .unwrap();
    }
    {
        let events = Arc::clone(&events);
        txn.queue_finally(move || {
            events.lock().push("finally");
            Ok(())
        })
        .unwrap();
    }
    txn.rollback().unwrap();
    assert_eq!(*events.lock(), vec!["failure", "finally"]);

    db.stop().unwrap();
}

// An engine wrapper that records the batch sizes requested from iterators.
struct CountingEngine {
    inner: MemoryEngine,
    batches: Arc<Mutex<Vec<usize>>>,
}

struct CountingIterator {
    inner: Box<dyn EngineIterator>,
    batches: Arc<Mutex<Vec<usize>>>,
}

impl EngineIterator for CountingIterator {
    fn seek(&mut self, key: &[u8]) -> EngineResult<()> {
        self.inner.seek(key)
    }

    fn nextv(&mut self, count: usize) -> EngineResult<(Vec<Entry>, bool)> {
        self.batches.lock().push(count);
        self.inner.nextv(count)
    }

    fn close(&mut self) -> EngineResult<()> {
        self.inner.close()
    }
}

impl Engine for CountingEngine {
    fn get(
        &self,
        key: &[u8],
        snapshot: Option<&dyn EngineSnapshot>,
    ) -> EngineResult<Option<Vec<u8>>> {
        self.inner.get(key, snapshot)
    }

    fn put(&self, key: &[u8], value: &[u8], sync: bool) -> EngineResult<()> {
        self.inner.put(key, value, sync)
    }

    fn del(&self, key: &[u8], sync: bool) -> EngineResult<()> {
        self.inner.del(key, sync)
    }

    fn batch(&self, ops: Vec<BatchOp>, sync: bool) -> EngineResult<()> {
        self.inner.batch(ops, sync)
    }

    fn clear(
        &self,
        range: &KeyRange,
        snapshot: Option<&dyn EngineSnapshot>,
        sync: bool,
    ) -> EngineResult<()> {
        self.inner.clear(range, snapshot, sync)
    }

    fn iterator(
        &self,
        range: KeyRange,
        reverse: bool,
        snapshot: Option<&dyn EngineSnapshot>,
    ) -> EngineResult<Box<dyn EngineIterator>> {
        let inner = self.inner.iterator(range, reverse, snapshot)?;
        Ok(Box::new(CountingIterator {
            inner,
            batches: Arc::clone(&self.batches),
        }))
    }

    fn snapshot(&self) -> EngineResult<Arc<dyn EngineSnapshot>> {
        self.inner.snapshot()
    }

    fn release_snapshot(&self, snapshot: &dyn EngineSnapshot) -> EngineResult<()> {
        self.inner.release_snapshot(snapshot)
    }

    fn transaction(&self, sync: bool) -> EngineResult<Box<dyn EngineTransaction>> {
        self.inner.transaction(sync)
    }

    fn close(&self) -> EngineResult<()> {
        self.inner.close()
    }
}

#[test]
fn iterator_adapts_batch_sizes() {
    let dir = tempdir().unwrap();
    let batches = Arc::new(Mutex::new(Vec::new()));
    let engine = CountingEngine {
        inner: MemoryEngine::in_memory(),
        batches: Arc::clone(&batches),
    };
    let db = Database::open_with_engine(
        dir.path(),
        DatabaseOptions::default(),
        Arc::new(engine),
    )
    .unwrap();

    let ops: Vec<WriteOp> = (0..1001)
        .map(|i| WriteOp::put([format!("key{i:04}")], &json!(i)).unwrap())
        .collect();
    db.batch(ops, false).unwrap();

    let iter = db.iterator(KeyPath::new(), IteratorOptions::default()).unwrap();

    // The first next() fetches a single-entry batch.
    iter.next_entry().unwrap().unwrap();
    assert_eq!(*batches.lock(), vec![1]);

    // The remaining thousand arrive in one full batch.
    let mut remaining = 0;
    while iter.next_entry().unwrap().is_some() {
        remaining += 1;
    }
    assert_eq!(remaining, 1000);
    assert_eq!(*batches.lock(), vec![1, 1000]);

    iter.destroy().unwrap();
    db.stop().unwrap();
}

#[test]
fn stop_then_destroy_removes_directory() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("db");
    let db = open_plain(&path);

    db.put(["k"], &json!(1), false).unwrap();
    assert!(matches!(db.destroy(), Err(CoreError::Running)));

    db.stop().unwrap();
    assert!(matches!(db.stop(), Err(CoreError::NotRunning)));
    assert!(matches!(
        db.get(["k"]),
        Err(CoreError::NotRunning)
    ));

    db.destroy().unwrap();
    assert!(!path.exists());
    assert!(matches!(db.destroy(), Err(CoreError::Destroyed)));
}
