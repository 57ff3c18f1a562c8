#![forbid(unsafe_code)]

//! Reference-semantics context map.
//!
//! [`ContextMap`] is a string-keyed map of [`ContextValue`] entries behind
//! a shared handle. Cloning copies the handle, so all clones observe all
//! mutations. The one type backs both roles the delivery layer needs:
//!
//! - a *published value*, rebuilt fresh for every delivery (handle identity
//!   differs per delivery), and
//! - a *cached view*, mutated in place for a subscriber's whole life
//!   (handle identity never changes).
//!
//! # Invariants
//!
//! 1. [`same`](ContextMap::same) is handle identity, never content
//!    comparison.
//! 2. [`get`](ContextMap::get) hands out clones of stored handles; the
//!    stored entry stays put.
//! 3. Mutation through any clone is visible through every clone.
//!
//! # Failure Modes
//!
//! Entries are behind a `RefCell`; re-entrant mutation from inside
//! [`for_each`](ContextMap::for_each) panics on the borrow. Collect keys
//! first ([`keys`](ContextMap::keys)) when the walk needs to mutate.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use ahash::AHashMap;

use crate::value::ContextValue;

// ─────────────────────────────── ContextMap ─────────────────────────────────

/// Shared, mutable, string-keyed map of identity-carrying values.
#[derive(Clone, Default)]
pub struct ContextMap {
    entries: Rc<RefCell<AHashMap<String, ContextValue>>>,
}

impl ContextMap {
    /// A fresh, empty map with its own identity.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Identity comparison: `true` iff both handles point at the same
    /// underlying map. Content equality plays no part.
    #[must_use]
    pub fn same(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.entries, &other.entries)
    }

    /// Insert or replace an entry. Visible through every clone.
    pub fn insert(&self, key: impl Into<String>, value: ContextValue) {
        self.entries.borrow_mut().insert(key.into(), value);
    }

    /// Remove an entry, returning its handle if present.
    pub fn remove(&self, key: &str) -> Option<ContextValue> {
        self.entries.borrow_mut().remove(key)
    }

    /// A clone of the handle stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<ContextValue> {
        self.entries.borrow().get(key).cloned()
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.borrow().contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Snapshot of the current keys, in no particular order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.entries.borrow().keys().cloned().collect()
    }

    /// Visit every entry.
    ///
    /// # Panics
    ///
    /// Panics if `f` mutates this map (the entry borrow is held for the
    /// whole walk).
    pub fn for_each(&self, mut f: impl FnMut(&str, &ContextValue)) {
        for (key, value) in self.entries.borrow().iter() {
            f(key, value);
        }
    }
}

impl FromIterator<(String, ContextValue)> for ContextMap {
    fn from_iter<I: IntoIterator<Item = (String, ContextValue)>>(iter: I) -> Self {
        Self {
            entries: Rc::new(RefCell::new(iter.into_iter().collect())),
        }
    }
}

impl fmt::Debug for ContextMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys = self.keys();
        keys.sort_unstable();
        f.debug_struct("ContextMap")
            .field("len", &keys.len())
            .field("keys", &keys)
            .finish()
    }
}

// ═════════════════════════════════ Tests ════════════════════════════════════
