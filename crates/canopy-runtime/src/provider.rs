#![forbid(unsafe_code)]

//! Store provider: owns mutable state and publishes it to a channel.
//!
//! [`StoreProvider`] is a factory bound to one channel; each
//! [`wrap`](StoreProvider::wrap) call produces an independent [`Provided`]
//! wrapper owning a copy of the factory's initial store. On every render
//! the wrapper publishes the store's entries plus its own [`UpdateHandle`]
//! under the reserved [`UPDATE_KEY`], then renders its target with the
//! externally supplied props untouched. Applying a patch through the
//! handle shallow-merges it into the store, republishes once, and
//! re-renders the target once.
//!
//! # Invariants
//!
//! 1. The update handle's identity is stable for the wrapper's whole life:
//!    it is wrapped into its [`ContextValue`] once at construction and
//!    every publish reuses that entry. A watcher of the reserved key sees
//!    a change only across distinct provider instances.
//! 2. Each `wrap` call copies the factory's initial store; instances never
//!    share state.
//! 3. The published map is rebuilt fresh per publish (its handle identity
//!    differs per delivery); its entries are clones of the store's handles.
//! 4. The reserved entry is written last, shadowing any store entry named
//!    [`UPDATE_KEY`].
//! 5. An empty patch still republishes and re-renders (downstream change
//!    detection sees no watched-key change, so versions hold still).
//!
//! # Failure Modes
//!
//! A handle outliving its wrapper logs a WARN and reports `false` from
//! [`UpdateHandle::apply`]; nothing is delivered. Re-entrant updates are
//! safe when issued from a delivery callback (the channel queues them);
//! see the subscriber module for the one render-phase case that panics.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{debug, warn};

use canopy_core::{ContextMap, ContextValue, Props, Store, StorePatch};

use crate::channel::ContextChannel;
use crate::component::Component;

/// Reserved key under which every published map carries the provider's
/// update handle. A store entry under this key is shadowed on publish.
pub const UPDATE_KEY: &str = "update";

// ────────────────────────────── StoreProvider ───────────────────────────────

/// Factory for provider wrappers bound to one channel.
#[derive(Clone)]
pub struct StoreProvider {
    channel: ContextChannel,
    initial: Store,
}

impl StoreProvider {
    #[must_use]
    pub fn new(channel: &ContextChannel) -> Self {
        Self {
            channel: channel.clone(),
            initial: Store::new(),
        }
    }

    /// Builder: replace the (default empty) initial store.
    #[must_use]
    pub fn with_initial(mut self, initial: Store) -> Self {
        self.initial = initial;
        self
    }

    /// Wrap a target component. Every call yields an independent wrapper
    /// with its own copy of the initial store and its own update handle.
    #[must_use]
    pub fn wrap<C: Component + 'static>(&self, target: C) -> Provided<C> {
        let channel = self.channel.clone();
        let initial = self.initial.clone();
        let shared = Rc::new_cyclic(|weak: &Weak<RefCell<ProviderShared<C>>>| {
            let apply: Rc<dyn Fn(&StorePatch) -> bool> = {
                let weak = weak.clone();
                Rc::new(move |patch: &StorePatch| match weak.upgrade() {
                    Some(shared) => {
                        apply_patch(&shared, patch);
                        true
                    }
                    None => {
                        warn!("store update dropped, provider no longer mounted");
                        false
                    }
                })
            };
            let update = UpdateHandle { apply };
            RefCell::new(ProviderShared {
                store: initial,
                channel,
                update_entry: ContextValue::new(update.clone()),
                update,
                last_props: Props::new(),
                target,
            })
        });
        Provided { shared }
    }
}

impl fmt::Debug for StoreProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreProvider")
            .field("initial", &self.initial)
            .finish()
    }
}

// ─────────────────────────────── UpdateHandle ───────────────────────────────

/// Stable, cloneable handle applying partial updates to one provider.
///
/// The handle a subscriber receives under [`UPDATE_KEY`] keeps one identity
/// for the provider's whole life, so watching the reserved key never
/// produces spurious version bumps.
#[derive(Clone)]
pub struct UpdateHandle {
    apply: Rc<dyn Fn(&StorePatch) -> bool>,
}

impl UpdateHandle {
    /// Shallow-merge `patch` into the owning provider's store, republish,
    /// and re-render the provider's target. Returns `false` (after a WARN
    /// log) when the provider has been dropped.
    pub fn apply(&self, patch: &StorePatch) -> bool {
        (self.apply)(patch)
    }

    /// Identity comparison: `true` iff both handles drive the same provider
    /// wrapper.
    #[must_use]
    pub fn same(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.apply, &other.apply)
    }
}

impl fmt::Debug for UpdateHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateHandle")
            .field("addr", &Rc::as_ptr(&self.apply).cast::<()>())
            .finish()
    }
}

// ──────────────────────────────── Provided ──────────────────────────────────

struct ProviderShared<C: Component> {
    store: Store,
    channel: ContextChannel,
    /// The update handle pre-wrapped for publishing; created once so the
    /// reserved entry keeps one identity across publishes.
    update_entry: ContextValue,
    update: UpdateHandle,
    last_props: Props,
    target: C,
}

/// A target component wrapped with a providing store.
pub struct Provided<C: Component> {
    shared: Rc<RefCell<ProviderShared<C>>>,
}

impl<C: Component> Provided<C> {
    /// Apply a partial update: shallow-merge, republish, re-render.
    pub fn update(&self, patch: &StorePatch) -> bool {
        let update = self.shared.borrow().update.clone();
        update.apply(patch)
    }

    /// A clone of the stable update handle.
    #[must_use]
    pub fn update_handle(&self) -> UpdateHandle {
        self.shared.borrow().update.clone()
    }

    /// Read the current store.
    pub fn with_store<R>(&self, f: impl FnOnce(&Store) -> R) -> R {
        f(&self.shared.borrow().store)
    }

    /// Access the wrapped target.
    pub fn with_target<R>(&self, f: impl FnOnce(&C) -> R) -> R {
        f(&self.shared.borrow().target)
    }
}

impl<C: Component> Component for Provided<C> {
    /// Publish the current store, then render the target with the incoming
    /// props untouched.
    fn render(&mut self, props: &Props) {
        let (channel, value) = {
            let mut shared = self.shared.borrow_mut();
            shared.last_props = props.clone();
            let value = delivered_value(&shared.store, &shared.update_entry);
            (shared.channel.clone(), value)
        };
        channel.publish(value);
        self.shared.borrow_mut().target.render(props);
    }
}

impl<C: Component> fmt::Debug for Provided<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shared = self.shared.borrow();
        f.debug_struct("Provided")
            .field("store", &shared.store)
            .finish()
    }
}

/// Build the published map: store entries plus the reserved entry, written
/// last so it shadows a store entry named [`UPDATE_KEY`].
fn delivered_value(store: &Store, update_entry: &ContextValue) -> ContextMap {
    let map = ContextMap::new();
    for (key, value) in store.iter() {
        map.insert(key, value.clone());
    }
    map.insert(UPDATE_KEY, update_entry.clone());
    map
}

fn apply_patch<C: Component>(shared: &Rc<RefCell<ProviderShared<C>>>, patch: &StorePatch) {
    let (channel, value, props) = {
        let mut state = shared.borrow_mut();
        let applied = state.store.merge(patch);
        debug!(applied, store_len = state.store.len(), "store patch merged");
        let value = delivered_value(&state.store, &state.update_entry);
        (state.channel.clone(), value, state.last_props.clone())
    };
    channel.publish(value);
    shared.borrow_mut().target.render(&props);
}

// ═════════════════════════════════ Tests ════════════════════════════════════
