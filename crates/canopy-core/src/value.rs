#![forbid(unsafe_code)]

//! Identity-carrying value handle.
//!
//! [`ContextValue`] wraps an arbitrary `'static` value in a shared,
//! reference-counted, type-erased handle. Cloning copies the handle, never
//! the payload, and [`same`](ContextValue::same) compares handles by
//! allocation address. That comparison is the only notion of "changed" the
//! subscriber layer understands.
//!
//! # Invariants
//!
//! 1. `same(a, b)` is true iff `a` and `b` were cloned from one wrapping
//!    call (or built from clones of one `Rc` via
//!    [`from_rc`](ContextValue::from_rc)).
//! 2. `same` never inspects payloads: equal payloads behind separate
//!    wrappings are *not* the same.
//! 3. A handle never changes identity after construction.
//!
//! # Example
//!
//! ```
//! use canopy_core::ContextValue;
//!
//! let a = ContextValue::new(42u32);
//! let b = a.clone();
//! let c = ContextValue::new(42u32);
//!
//! assert!(a.same(&b));
//! assert!(!a.same(&c)); // equal payload, distinct wrapping
//! assert_eq!(a.downcast_ref::<u32>(), Some(&42));
//! ```

use std::any::Any;
use std::fmt;
use std::rc::Rc;

// ─────────────────────────────── ContextValue ───────────────────────────────

/// A cheaply cloneable, type-erased value with reference identity.
#[derive(Clone)]
pub struct ContextValue {
    payload: Rc<dyn Any>,
    /// Concrete type name captured at wrap time, for diagnostics only.
    type_name: &'static str,
}

impl ContextValue {
    /// Wrap a value in a fresh handle.
    ///
    /// Every call allocates: two handles wrapping equal payloads are never
    /// [`same`](Self::same).
    #[must_use]
    pub fn new<T: 'static>(value: T) -> Self {
        Self {
            payload: Rc::new(value),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Wrap an existing shared allocation without copying it.
    ///
    /// Handles built from clones of one `Rc` compare as
    /// [`same`](Self::same), which is how callers thread one value through
    /// several keys or publishes while keeping its identity.
    #[must_use]
    pub fn from_rc<T: 'static>(value: Rc<T>) -> Self {
        Self {
            payload: value,
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Identity comparison: `true` iff both handles point at the same
    /// allocation. Never inspects payloads.
    #[must_use]
    pub fn same(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.payload, &other.payload)
    }

    /// Whether the payload is a `T`.
    #[must_use]
    pub fn is<T: 'static>(&self) -> bool {
        self.payload.is::<T>()
    }

    /// Borrow the payload as a `T`, if it is one.
    #[must_use]
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.payload.downcast_ref::<T>()
    }

    /// Recover the shared payload as an `Rc<T>`.
    ///
    /// On type mismatch the handle comes back unchanged in `Err`, mirroring
    /// [`Rc::downcast`].
    pub fn downcast<T: 'static>(self) -> Result<Rc<T>, Self> {
        let type_name = self.type_name;
        self.payload
            .downcast::<T>()
            .map_err(|payload| Self { payload, type_name })
    }

    /// Name of the payload's concrete type, for diagnostics.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Debug for ContextValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextValue")
            .field("type", &self.type_name)
            .field("addr", &Rc::as_ptr(&self.payload).cast::<()>())
            .finish()
    }
}

impl<T: 'static> From<Rc<T>> for ContextValue {
    fn from(value: Rc<T>) -> Self {
        Self::from_rc(value)
    }
}

// ═════════════════════════════════ Tests ════════════════════════════════════
