#![forbid(unsafe_code)]

//! Structured component props.
//!
//! A [`Props`] bundle carries the two fields the delivery layer computes —
//! the context view and its version — plus an open bag of pass-through
//! entries supplied from outside. Keeping the computed fields structured
//! (rather than spread into the bag) means a collision between an external
//! entry named `"context"` and the computed view cannot happen silently:
//! the two live in different places and precedence is explicit.
//!
//! [`Props::over`] merges two bundles with fixed precedence: the overlay
//! wins every collision, field or bag entry. The delivery layer lays
//! externally supplied props *over* its computed pair, so callers can
//! deliberately override either field.
//!
//! [`Props::shallow_eq`] compares bundles the way a memoizing target does:
//! value equality for the version, handle identity for the view and every
//! bag entry, never payload contents. A subscriber's cached view keeps one
//! handle for its whole life, so under this comparison the view field alone
//! never changes — the version is the signal that data behind it moved.

use std::fmt;

use ahash::AHashMap;

use crate::map::ContextMap;
use crate::value::ContextValue;

// ────────────────────────────────── Props ───────────────────────────────────

/// Props bundle: computed context/version fields plus pass-through entries.
#[derive(Clone, Default)]
pub struct Props {
    context: Option<ContextMap>,
    version: Option<u64>,
    extra: AHashMap<String, ContextValue>,
}

impl Props {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: set the context view.
    #[must_use]
    pub fn with_context(mut self, context: ContextMap) -> Self {
        self.context = Some(context);
        self
    }

    /// Builder: set the version field.
    #[must_use]
    pub fn with_version(mut self, version: u64) -> Self {
        self.version = Some(version);
        self
    }

    /// Builder: add a pass-through entry wrapping a fresh value.
    #[must_use]
    pub fn with_value<T: 'static>(self, key: impl Into<String>, value: T) -> Self {
        self.with_entry(key, ContextValue::new(value))
    }

    /// Builder: add a pass-through entry from an existing handle.
    #[must_use]
    pub fn with_entry(mut self, key: impl Into<String>, value: ContextValue) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// The context view, when one was delivered.
    #[must_use]
    pub fn context(&self) -> Option<&ContextMap> {
        self.context.as_ref()
    }

    /// The version field, when one was delivered.
    #[must_use]
    pub const fn version(&self) -> Option<u64> {
        self.version
    }

    /// A pass-through entry by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ContextValue> {
        self.extra.get(key)
    }

    /// Number of pass-through entries.
    #[must_use]
    pub fn extra_len(&self) -> usize {
        self.extra.len()
    }

    /// Lay `self` over `base`: every field and bag entry present in `self`
    /// wins; the rest comes from `base`.
    #[must_use]
    pub fn over(self, base: Props) -> Props {
        let mut merged = base;
        if self.context.is_some() {
            merged.context = self.context;
        }
        if self.version.is_some() {
            merged.version = self.version;
        }
        merged.extra.extend(self.extra);
        merged
    }

    /// Shallow comparison: version by value, view and bag entries by handle
    /// identity. Never inspects payloads.
    #[must_use]
    pub fn shallow_eq(&self, other: &Props) -> bool {
        let context_eq = match (&self.context, &other.context) {
            (None, None) => true,
            (Some(a), Some(b)) => a.same(b),
            _ => false,
        };
        if !context_eq || self.version != other.version || self.extra.len() != other.extra.len() {
            return false;
        }
        self.extra
            .iter()
            .all(|(key, value)| other.extra.get(key).is_some_and(|v| v.same(value)))
    }
}

impl fmt::Debug for Props {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&str> = self.extra.keys().map(String::as_str).collect();
        keys.sort_unstable();
        f.debug_struct("Props")
            .field("context", &self.context)
            .field("version", &self.version)
            .field("extra", &keys)
            .finish()
    }
}

// ═════════════════════════════════ Tests ════════════════════════════════════
