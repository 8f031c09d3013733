//! Per-key advisory locks.
//!
//! Mutating operations lock every `(collection, key)` they are going to
//! touch before reading or writing. The whole set is taken at once: a
//! caller either gets all of its keys or waits holding none, so two
//! operations can never wait on each other.

use crate::error::{CoreError, CoreResult};
use crate::types::EntityRef;
use parking_lot::{Condvar, Mutex};
use std::collections::{BTreeSet, HashSet};
use std::time::{Duration, Instant};
use tracing::trace;

/// Table of currently locked keys.
#[derive(Debug)]
pub struct KeyLockTable {
    held: Mutex<HashSet<EntityRef>>,
    released: Condvar,
    timeout: Duration,
}

impl KeyLockTable {
    /// Creates an empty table; acquisitions wait at most `timeout`.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            held: Mutex::new(HashSet::new()),
            released: Condvar::new(),
            timeout,
        }
    }

    /// Locks every key in `keys`.
    ///
    /// Duplicates are ignored. Locks are not reentrant: asking for a key
    /// this thread already holds waits until the timeout.
    ///
    /// # Errors
    ///
    /// Returns `LockTimeout` if the keys did not all become free in time.
    pub fn acquire(&self, keys: impl IntoIterator<Item = EntityRef>) -> CoreResult<KeyLockGuard<'_>> {
        let keys: Vec<EntityRef> = keys.into_iter().collect::<BTreeSet<_>>().into_iter().collect();
        let deadline = Instant::now() + self.timeout;

        let mut held = self.held.lock();
        while keys.iter().any(|key| held.contains(key)) {
            if self.released.wait_until(&mut held, deadline).timed_out()
                && keys.iter().any(|key| held.contains(key))
            {
                return Err(CoreError::LockTimeout {
                    keys: keys.into_iter().map(|entity| entity.key).collect(),
                });
            }
        }
        held.extend(keys.iter().cloned());
        drop(held);

        trace!(count = keys.len(), "key locks acquired");
        Ok(KeyLockGuard { table: self, keys })
    }

    /// Number of keys currently locked.
    #[must_use]
    pub fn held_count(&self) -> usize {
        self.held.lock().len()
    }
}

/// Releases its keys on drop.
#[derive(Debug)]
pub struct KeyLockGuard<'a> {
    table: &'a KeyLockTable,
    keys: Vec<EntityRef>,
}

impl KeyLockGuard<'_> {
    /// Returns true if `entity` is covered by this guard.
    #[must_use]
    pub fn covers(&self, entity: &EntityRef) -> bool {
        self.keys.binary_search(entity).is_ok()
    }
}

impl Drop for KeyLockGuard<'_> {
    fn drop(&mut self) {
        let mut held = self.table.held.lock();
        for key in &self.keys {
            held.remove(key);
        }
        drop(held);
        self.table.released.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::normalize;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    fn store(name: &str) -> EntityRef {
        EntityRef::store(normalize(name))
    }

    #[test]
    fn guard_releases_on_drop() {
        let table = KeyLockTable::new(Duration::from_millis(10));
        {
            let guard = table.acquire([store("a"), store("b"), store("A")]).unwrap();
            assert_eq!(table.held_count(), 2);
            assert!(guard.covers(&store("a")));
            assert!(!guard.covers(&store("c")));
        }
        assert_eq!(table.held_count(), 0);
    }

    #[test]
    fn disjoint_sets_do_not_block() {
        let table = KeyLockTable::new(Duration::from_millis(10));
        let _a = table.acquire([store("a")]).unwrap();
        let _b = table.acquire([store("b"), EntityRef::user(normalize("a"))]).unwrap();
        assert_eq!(table.held_count(), 3);
    }

    #[test]
    fn overlapping_set_times_out() {
        let table = KeyLockTable::new(Duration::from_millis(20));
        let _held = table.acquire([store("a")]).unwrap();
        let err = table.acquire([store("b"), store("a")]).unwrap_err();
        assert!(matches!(err, CoreError::LockTimeout { .. }));
        assert_eq!(table.held_count(), 1);
    }

    #[test]
    fn waiter_proceeds_after_release() {
        let table = Arc::new(KeyLockTable::new(Duration::from_secs(5)));
        let inside = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();

        for _ in 0..8 {
            let table = Arc::clone(&table);
            let inside = Arc::clone(&inside);
            handles.push(thread::spawn(move || {
                let _guard = table.acquire([store("shared")]).unwrap();
                assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                thread::sleep(Duration::from_millis(2));
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(table.held_count(), 0);
    }
}
