//! Concurrent front-end for the persistent trie.

use std::any::Any;
use std::ops::Deref;
use std::sync::Arc;

use parking_lot::Mutex;

use super::Trie;

/// A value borrowed from a trie snapshot.
///
/// The guard keeps its snapshot's root alive, so the value stays valid
/// no matter how many newer roots writers install after the lookup.
pub struct ValueGuard<T> {
    /// Held only to pin the snapshot.
    _root: Trie,
    value: Arc<T>,
}

impl<T> Deref for ValueGuard<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

/// Thread-safe key-value store over [`Trie`] snapshots.
///
/// Two locks with very different scopes:
/// - `root`: a short critical section protecting the root *handle*.
///   Readers clone the handle under it and immediately release it; all
///   actual trie work happens lock-free on the snapshot.
/// - `write_lock`: serializes writers end to end. A writer computes its
///   new root outside the root lock and swaps it in under it, so
///   readers are never blocked behind a write.
#[derive(Default)]
pub struct TrieStore {
    root: Mutex<Trie>,
    write_lock: Mutex<()>,
}

impl TrieStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up `key` in the current root.
    ///
    /// Returns a guard bundling the snapshot and the value; `None` if
    /// the key is absent or bound to a different type.
    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<ValueGuard<T>> {
        let snapshot = self.root.lock().clone();
        let value = snapshot.get_arc::<T>(key)?;
        Some(ValueGuard {
            _root: snapshot,
            value,
        })
    }

    /// Bind `key` to `value`.
    pub fn put<T: Any + Send + Sync>(&self, key: &str, value: T) {
        let _writer = self.write_lock.lock();

        let snapshot = self.root.lock().clone();
        let new_root = snapshot.put(key, value);
        *self.root.lock() = new_root;
    }

    /// Unbind `key`.
    pub fn remove(&self, key: &str) {
        let _writer = self.write_lock.lock();

        let snapshot = self.root.lock().clone();
        let new_root = snapshot.remove(key);
        *self.root.lock() = new_root;
    }
}
