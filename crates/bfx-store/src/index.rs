//! Prefix index over canonical keys
//!
//! Provides [`KeyIndex`] for prefix listing using radix_trie. The index is
//! a read-side convenience rebuilt from the backend at open and kept
//! current by the store facades; the backend stays the source of truth.

use parking_lot::RwLock;
use radix_trie::{Trie, TrieCommon};

use crate::srl::Version;

/// Thread-safe radix-trie index of canonical keys to their head versions
#[derive(Debug, Default)]
pub struct KeyIndex {
    trie: RwLock<Trie<String, Version>>,
}

impl KeyIndex {
    /// Create an empty index
    #[must_use]
    pub fn new() -> Self {
        Self {
            trie: RwLock::new(Trie::new()),
        }
    }

    /// Build an index from `(key, head version)` pairs
    pub fn rebuild(&self, entries: impl IntoIterator<Item = (String, Version)>) {
        let mut trie = Trie::new();
        for (key, head) in entries {
            trie.insert(key, head);
        }
        *self.trie.write() = trie;
    }

    /// Record a key's new head version
    pub fn insert(&self, key: impl Into<String>, head: Version) {
        self.trie.write().insert(key.into(), head);
    }

    /// Drop a key (purged lineage)
    pub fn remove(&self, key: &str) {
        self.trie.write().remove(key);
    }

    /// Head version of a key, if indexed
    #[must_use]
    pub fn head(&self, key: &str) -> Option<Version> {
        self.trie.read().get(key).copied()
    }

    /// Whether the key is indexed
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.head(key).is_some()
    }

    /// All keys sharing a byte prefix, sorted
    #[must_use]
    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        let trie = self.trie.read();
        let mut keys: Vec<String> = if prefix.is_empty() {
            trie.keys().cloned().collect()
        } else {
            trie.get_raw_descendant(prefix)
                .map(|subtrie| subtrie.keys().cloned().collect())
                .unwrap_or_default()
        };
        keys.sort();
        keys
    }

    /// All indexed keys, sorted
    #[must_use]
    pub fn all_keys(&self) -> Vec<String> {
        self.keys_with_prefix("")
    }

    /// Number of indexed keys
    #[must_use]
    pub fn len(&self) -> usize {
        self.trie.read().len()
    }

    /// Whether the index is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
