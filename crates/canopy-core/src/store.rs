#![forbid(unsafe_code)]

//! Provider-owned store and partial updates.
//!
//! [`Store`] is the mutable key/value state a provider owns. Unlike
//! [`ContextMap`](crate::ContextMap) it is plainly owned, not a shared
//! handle: exactly one provider mutates it, and clones are genuine copies
//! (of handles, not payloads).
//!
//! [`StorePatch`] is an ordered partial update. [`Store::merge`] applies
//! one shallowly:
//!
//! - top-level keys named by the patch overwrite (or insert),
//! - keys absent from the patch are untouched,
//! - a merge never removes keys.
//!
//! Values move by handle, so "overwrite with the handle already stored" is
//! invisible to identity-based change detection downstream. Re-publish the
//! same handle to express "unchanged".

use std::fmt;

use ahash::AHashMap;

use crate::value::ContextValue;

// ────────────────────────────────── Store ───────────────────────────────────

/// Mutable key/value state owned by one provider.
#[derive(Clone, Default)]
pub struct Store {
    entries: AHashMap<String, ContextValue>,
}

impl Store {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: seed `key` with a freshly wrapped `value`.
    #[must_use]
    pub fn with<T: 'static>(self, key: impl Into<String>, value: T) -> Self {
        self.with_value(key, ContextValue::new(value))
    }

    /// Builder: seed `key` with an existing handle.
    #[must_use]
    pub fn with_value(mut self, key: impl Into<String>, value: ContextValue) -> Self {
        self.entries.insert(key.into(), value);
        self
    }

    /// Insert or replace an entry.
    pub fn insert(&mut self, key: impl Into<String>, value: ContextValue) {
        self.entries.insert(key.into(), value);
    }

    /// Shallow-merge a patch, in patch order. Returns the number of patch
    /// entries applied (a key listed twice counts twice; the later entry
    /// wins).
    pub fn merge(&mut self, patch: &StorePatch) -> usize {
        let mut applied = 0;
        for (key, value) in patch.iter() {
            self.entries.insert(key.to_owned(), value.clone());
            applied += 1;
        }
        applied
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ContextValue> {
        self.entries.get(key)
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of the current keys, in no particular order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ContextValue)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys = self.keys();
        keys.sort_unstable();
        f.debug_struct("Store")
            .field("len", &keys.len())
            .field("keys", &keys)
            .finish()
    }
}

// ──────────────────────────────── StorePatch ────────────────────────────────

/// Ordered partial update to a [`Store`].
///
/// Entries apply in insertion order; when one key appears twice the later
/// entry wins. An empty patch merges as a no-op (though a provider still
/// redelivers; see `canopy-runtime`).
#[derive(Clone, Default)]
pub struct StorePatch {
    entries: Vec<(String, ContextValue)>,
}

impl StorePatch {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Builder: update `key` to a freshly wrapped `value`.
    #[must_use]
    pub fn set<T: 'static>(self, key: impl Into<String>, value: T) -> Self {
        self.set_value(key, ContextValue::new(value))
    }

    /// Builder: update `key` to an existing handle. Passing the handle a
    /// store already holds makes the merge a no-op for change detection.
    #[must_use]
    pub fn set_value(mut self, key: impl Into<String>, value: ContextValue) -> Self {
        self.entries.push((key.into(), value));
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ContextValue)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }
}

impl fmt::Debug for StorePatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<&str> = self.entries.iter().map(|(key, _)| key.as_str()).collect();
        f.debug_struct("StorePatch")
            .field("len", &keys.len())
            .field("keys", &keys)
            .finish()
    }
}

// ═════════════════════════════════ Tests ════════════════════════════════════
