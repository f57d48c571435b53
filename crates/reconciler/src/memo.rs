//! Bounded memo scoped to one block or one sweep chunk.

use std::collections::HashMap;
use std::hash::Hash;

/// Default number of entries kept before new inserts are refused.
pub const DEFAULT_MEMO_CAPACITY: usize = 1024;

/// A small bounded map that lives for one reconciliation scope.
///
/// Created when a block (watcher) or chunk (sweep) starts and dropped when it
/// ends, so nothing memoized here outlives the chain state it was read from.
/// When full, inserts are ignored and callers fall back to the remote query.
#[derive(Debug, Clone)]
pub struct ScopedMemo<K, V> {
    entries: HashMap<K, V>,
    capacity: usize,
}

impl<K: Eq + Hash, V: Clone> ScopedMemo<K, V> {
    /// Create a memo holding at most `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            capacity,
        }
    }

    /// Cached value for `key`.
    pub fn get(&self, key: &K) -> Option<V> {
        self.entries.get(key).cloned()
    }

    /// Store a value. Returns false when the memo is full and the value was
    /// not stored.
    pub fn insert(&mut self, key: K, value: V) -> bool {
        if self.entries.len() >= self.capacity && !self.entries.contains_key(&key) {
            return false;
        }
        self.entries.insert(key, value);
        true
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Eq + Hash, V: Clone> Default for ScopedMemo<K, V> {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_MEMO_CAPACITY)
    }
}

/// Per-account dedupe set for one scope.
pub type SeenAccounts = ScopedMemo<noter_types::AccountId32, ()>;

impl SeenAccounts {
    /// Record `account` as handled in this scope. Returns false if it already was.
    pub fn first_sighting(&mut self, account: &noter_types::AccountId32) -> bool {
        if self.contains(account) {
            return false;
        }
        // A full memo still lets the account through; dedupe is best effort.
        self.insert(account.clone(), ());
        true
    }
}
