//! Process-local advisory lock registry.
//!
//! A [`LockBox`] maps arbitrary string keys to reader-writer locks created
//! on demand. Multi-key acquisition sorts the deduplicated keys ascending so
//! that transactions acquiring overlapping sets cannot deadlock on ordering
//! alone; there is no deadlock detection beyond that discipline.

use parking_lot::lock_api::{ArcRwLockReadGuard, ArcRwLockWriteGuard};
use parking_lot::{Mutex, RawRwLock, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

/// Sharing mode of an advisory lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockMode {
    /// Shared; any number of readers may hold the key.
    Read,
    /// Exclusive; a single writer holds the key.
    #[default]
    Write,
}

/// A single lock acquisition request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockRequest {
    /// The lock key.
    pub key: String,
    /// Requested mode.
    pub mode: LockMode,
}

impl LockRequest {
    /// Creates a request for `key` in `mode`.
    pub fn new(key: impl Into<String>, mode: LockMode) -> Self {
        Self {
            key: key.into(),
            mode,
        }
    }

    /// Creates a shared request.
    pub fn read(key: impl Into<String>) -> Self {
        Self::new(key, LockMode::Read)
    }

    /// Creates an exclusive request.
    pub fn write(key: impl Into<String>) -> Self {
        Self::new(key, LockMode::Write)
    }
}

impl From<&str> for LockRequest {
    fn from(key: &str) -> Self {
        Self::write(key)
    }
}

impl From<String> for LockRequest {
    fn from(key: String) -> Self {
        Self::write(key)
    }
}

impl From<(&str, LockMode)> for LockRequest {
    fn from((key, mode): (&str, LockMode)) -> Self {
        Self::new(key, mode)
    }
}

impl From<(String, LockMode)> for LockRequest {
    fn from((key, mode): (String, LockMode)) -> Self {
        Self::new(key, mode)
    }
}

enum GuardKind {
    Read(ArcRwLockReadGuard<RawRwLock, ()>),
    Write(ArcRwLockWriteGuard<RawRwLock, ()>),
}

/// An owned release handle for one held key.
///
/// Dropping the guard releases the lock.
pub struct LockGuard {
    key: String,
    mode: LockMode,
    _guard: GuardKind,
}

impl LockGuard {
    /// The key this guard holds.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The mode this guard holds the key in.
    #[must_use]
    pub fn mode(&self) -> LockMode {
        self.mode
    }
}

impl fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockGuard")
            .field("key", &self.key)
            .field("mode", &self.mode)
            .finish()
    }
}

/// Registry of advisory reader-writer locks keyed by string.
#[derive(Default)]
pub struct LockBox {
    cells: Mutex<HashMap<String, Arc<RwLock<()>>>>,
}

impl LockBox {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn cell(&self, key: &str) -> Arc<RwLock<()>> {
        let mut cells = self.cells.lock();
        Arc::clone(
            cells
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(RwLock::new(()))),
        )
    }

    /// Acquires `key` in `mode`, blocking until available.
    pub fn lock(&self, key: &str, mode: LockMode) -> LockGuard {
        let cell = self.cell(key);
        let guard = match mode {
            LockMode::Read => GuardKind::Read(cell.read_arc()),
            LockMode::Write => GuardKind::Write(cell.write_arc()),
        };
        LockGuard {
            key: key.to_string(),
            mode,
            _guard: guard,
        }
    }

    /// Acquires several keys at once.
    ///
    /// Requests are deduplicated by key (an exclusive request wins over a
    /// shared one for the same key) and acquired in ascending key order.
    /// Returns the guards in acquisition order.
    pub fn lock_multi(&self, requests: &[LockRequest]) -> Vec<LockGuard> {
        let mut wanted: BTreeMap<&str, LockMode> = BTreeMap::new();
        for request in requests {
            wanted
                .entry(request.key.as_str())
                .and_modify(|mode| {
                    if request.mode == LockMode::Write {
                        *mode = LockMode::Write;
                    }
                })
                .or_insert(request.mode);
        }
        wanted
            .into_iter()
            .map(|(key, mode)| self.lock(key, mode))
            .collect()
    }

    /// Drops the registry entry for `key` if no guard holds it.
    pub fn prune(&self, key: &str) {
        let mut cells = self.cells.lock();
        if let Some(cell) = cells.get(key) {
            if Arc::strong_count(cell) == 1 {
                cells.remove(key);
            }
        }
    }

    /// Number of keys currently registered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.lock().len()
    }

    /// Returns true if no keys are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.lock().is_empty()
    }
}

impl fmt::Debug for LockBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockBox")
            .field("keys", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    #[test]
    fn read_locks_are_shared() {
        let lockbox = LockBox::new();
        let guard1 = lockbox.lock("key", LockMode::Read);
        let guard2 = lockbox.lock("key", LockMode::Read);
        assert_eq!(guard1.key(), "key");
        assert_eq!(guard2.mode(), LockMode::Read);
    }

    #[test]
    fn write_lock_excludes_other_writers() {
        let lockbox = Arc::new(LockBox::new());
        let guard = lockbox.lock("key", LockMode::Write);

        let acquired = Arc::new(AtomicBool::new(false));
        let handle = {
            let lockbox = Arc::clone(&lockbox);
            let acquired = Arc::clone(&acquired);
            std::thread::spawn(move || {
                let _guard = lockbox.lock("key", LockMode::Write);
                acquired.store(true, Ordering::SeqCst);
            })
        };

        std::thread::sleep(Duration::from_millis(50));
        assert!(!acquired.load(Ordering::SeqCst));

        drop(guard);
        handle.join().unwrap();
        assert!(acquired.load(Ordering::SeqCst));
    }

    #[test]
    fn lock_multi_sorts_and_dedups() {
        let lockbox = LockBox::new();
        let guards = lockbox.lock_multi(&[
            LockRequest::write("beta"),
            LockRequest::read("alpha"),
            LockRequest::read("beta"),
        ]);

        let keys: Vec<_> = guards.iter().map(LockGuard::key).collect();
        assert_eq!(keys, vec!["alpha", "beta"]);
        // The duplicate "beta" collapses to the exclusive request.
        assert_eq!(guards[1].mode(), LockMode::Write);
    }

    #[test]
    fn prune_removes_unheld_keys() {
        let lockbox = LockBox::new();
        let guard = lockbox.lock("key", LockMode::Write);
        assert_eq!(lockbox.len(), 1);

        // Held keys are not pruned.
        lockbox.prune("key");
        assert_eq!(lockbox.len(), 1);

        drop(guard);
        lockbox.prune("key");
        assert!(lockbox.is_empty());
    }

    #[test]
    fn request_conversions() {
        let request: LockRequest = "key".into();
        assert_eq!(request.mode, LockMode::Write);

        let request: LockRequest = ("key", LockMode::Read).into();
        assert_eq!(request.mode, LockMode::Read);
    }
}
