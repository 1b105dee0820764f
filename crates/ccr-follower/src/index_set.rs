//! Concurrency-safe ordered set of leader index names.
//!
//! The autofollow poll loop and the retry timer both mutate these sets, from
//! different tasks. Only whole-set operations are exposed, so no caller can hold the
//! lock across an await point.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A shared, ordered set of index names. Clones share the same storage.
#[derive(Debug, Clone, Default)]
pub struct IndexSet {
    inner: Arc<Mutex<BTreeSet<String>>>,
}

impl IndexSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    fn guard(&self) -> MutexGuard<'_, BTreeSet<String>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a name. Returns false if it was already present.
    pub fn insert(&self, name: &str) -> bool {
        self.guard().insert(name.to_string())
    }

    /// Remove a name. Returns false if it was absent.
    pub fn remove(&self, name: &str) -> bool {
        self.guard().remove(name)
    }

    /// Remove every name in `names`.
    pub fn remove_all<'a>(&self, names: impl IntoIterator<Item = &'a String>) {
        let mut set = self.guard();
        for name in names {
            set.remove(name);
        }
    }

    /// Remove everything.
    pub fn clear(&self) {
        self.guard().clear();
    }

    /// Returns true if the name is present.
    pub fn contains(&self, name: &str) -> bool {
        self.guard().contains(name)
    }

    /// Number of names.
    pub fn len(&self) -> usize {
        self.guard().len()
    }

    /// Returns true if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.guard().is_empty()
    }

    /// Point-in-time copy of the contents.
    pub fn snapshot(&self) -> BTreeSet<String> {
        self.guard().clone()
    }
}
