#![forbid(unsafe_code)]

//! Selective subscriber: filtered, version-tagged context views.
//!
//! [`SelectiveSubscriber`] is a factory bound to one channel; each
//! [`wrap`](SelectiveSubscriber::wrap) call produces a [`Connected`]
//! wrapper owning a cached view and a version counter. On every delivery
//! the wrapper walks its watch list in order — the configured keys, then
//! the reserved [`UPDATE_KEY`] — and for each key whose delivered handle
//! differs from the cached one by identity, bumps the version by one and
//! folds the handle into the cache. The target then renders with
//! `{context: view, version}` laid under any externally supplied props
//! (external fields win).
//!
//! # Invariants
//!
//! 1. The cached view's handle identity never changes for the wrapper's
//!    life; its contents mutate in place. A downstream shallow-equality
//!    guard therefore never sees the view field change — the version field
//!    is the signal that watched data moved.
//! 2. The version starts at 0, never decreases, and grows by exactly the
//!    number of watched keys whose identity changed in a delivery (N
//!    changes in one delivery are N increments, not one).
//! 3. Comparison is strictly handle identity: equal payloads behind fresh
//!    handles count as changes; interior mutation behind a kept handle
//!    does not.
//! 4. An empty watch list disables filtering and versioning: the delivered
//!    map is forwarded by handle and the version stays 0. Downstream
//!    guards then key off the per-publish map identity instead.
//!
//! # Edge cases
//!
//! - A key listed twice (or the reserved key listed explicitly) is visited
//!   twice; the second visit sees the freshly cached handle and is a
//!   no-op.
//! - A watched key absent from a delivery while cached counts as one
//!   change and removes the cache entry. (A provider's merge never removes
//!   keys, but the channel accepts arbitrary maps.)
//! - Redelivering a map whose watched handles are unchanged bumps nothing.
//! - A host render before any publish delivers an empty map.
//!
//! # Panics
//!
//! A target that calls [`UpdateHandle`](crate::UpdateHandle) from inside
//! its own `render` panics on a `RefCell` borrow *if* the wrapper was
//! rendered directly by the host while the channel was idle: the update
//! publishes immediately and re-enters the wrapper mid-render. The channel
//! abandons the unwound pass and keeps working, and the wrapper stays
//! usable. The same call issued from a delivery callback is safe — the
//! channel queues the publish until the running pass completes. Apply
//! updates from event handlers or delivery callbacks, not from render
//! bodies.

use std::cell::RefCell;
use std::fmt;
use std::iter;
use std::rc::Rc;

use tracing::trace;

use canopy_core::{ContextMap, Props};

use crate::channel::{ContextChannel, Subscription};
use crate::component::Component;
use crate::provider::UPDATE_KEY;

// ─────────────────────────────── WatchedKeys ────────────────────────────────

/// Ordered watch list, fixed at construction.
#[derive(Clone, Debug, Default)]
pub struct WatchedKeys {
    keys: Vec<String>,
}

impl WatchedKeys {
    /// Watch nothing: full passthrough mode.
    #[must_use]
    pub const fn none() -> Self {
        Self { keys: Vec::new() }
    }

    /// Watch the given keys, in the given order.
    #[must_use]
    pub fn of<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// The keys as configured. The reserved update key is appended during
    /// the delivery walk, not stored here.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(String::as_str)
    }
}

// ─────────────────────────── SelectiveSubscriber ────────────────────────────

/// Factory for subscriber wrappers bound to one channel.
#[derive(Clone)]
pub struct SelectiveSubscriber {
    channel: ContextChannel,
    keys: WatchedKeys,
}

impl SelectiveSubscriber {
    /// A factory watching nothing (passthrough mode).
    #[must_use]
    pub fn new(channel: &ContextChannel) -> Self {
        Self {
            channel: channel.clone(),
            keys: WatchedKeys::none(),
        }
    }

    /// Builder: replace the watch list.
    #[must_use]
    pub fn with_keys<I, K>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        self.keys = WatchedKeys::of(keys);
        self
    }

    /// Wrap a target component. The wrapper subscribes immediately and
    /// stays subscribed until dropped; deliveries reach it whether or not
    /// the host ever renders it.
    #[must_use]
    pub fn wrap<C: Component + 'static>(&self, target: C) -> Connected<C> {
        let shared = Rc::new(RefCell::new(ConnectedShared {
            keys: self.keys.clone(),
            view: ContextMap::new(),
            version: 0,
            last_props: Props::new(),
            target,
        }));
        let delivery = {
            let weak = Rc::downgrade(&shared);
            self.channel.subscribe(move |data| {
                if let Some(shared) = weak.upgrade() {
                    deliver(&shared, data);
                }
            })
        };
        Connected {
            shared,
            channel: self.channel.clone(),
            _delivery: delivery,
        }
    }
}

impl fmt::Debug for SelectiveSubscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectiveSubscriber")
            .field("keys", &self.keys)
            .finish()
    }
}

// ─────────────────────────────── Connected ──────────────────────────────────

struct ConnectedShared<C: Component> {
    keys: WatchedKeys,
    /// Cached view; handle identity fixed for the wrapper's life.
    view: ContextMap,
    version: u64,
    last_props: Props,
    target: C,
}

/// A target component wrapped with a selective context subscription.
///
/// Dropping it cancels the subscription.
pub struct Connected<C: Component> {
    shared: Rc<RefCell<ConnectedShared<C>>>,
    channel: ContextChannel,
    _delivery: Subscription,
}

impl<C: Component> Connected<C> {
    /// Current version counter (0 in passthrough mode, always).
    #[must_use]
    pub fn version(&self) -> u64 {
        self.shared.borrow().version
    }

    /// A clone of the cached view handle.
    #[must_use]
    pub fn view(&self) -> ContextMap {
        self.shared.borrow().view.clone()
    }

    /// Access the wrapped target.
    pub fn with_target<R>(&self, f: impl FnOnce(&C) -> R) -> R {
        f(&self.shared.borrow().target)
    }
}

impl<C: Component> Component for Connected<C> {
    /// Remember the incoming props for later deliveries, then run one
    /// delivery against the channel's current value (an empty map when
    /// nothing has been published yet).
    fn render(&mut self, props: &Props) {
        self.shared.borrow_mut().last_props = props.clone();
        let data = self.channel.current().unwrap_or_default();
        deliver(&self.shared, &data);
    }
}

impl<C: Component> fmt::Debug for Connected<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shared = self.shared.borrow();
        f.debug_struct("Connected")
            .field("keys", &shared.keys)
            .field("version", &shared.version)
            .finish()
    }
}

/// One delivery: diff the watched keys, fold changes into the cache, render
/// the target.
fn deliver<C: Component>(shared: &Rc<RefCell<ConnectedShared<C>>>, data: &ContextMap) {
    let mut guard = shared.borrow_mut();
    let state = &mut *guard;

    let view = if state.keys.is_empty() {
        data.clone()
    } else {
        for key in state.keys.iter().chain(iter::once(UPDATE_KEY)) {
            let cached = state.view.get(key);
            let incoming = data.get(key);
            let changed = match (&cached, &incoming) {
                (Some(cached), Some(incoming)) => !cached.same(incoming),
                (None, None) => false,
                _ => true,
            };
            if changed {
                state.version += 1;
                match incoming {
                    Some(value) => state.view.insert(key, value),
                    None => {
                        state.view.remove(key);
                    }
                }
                trace!(key, version = state.version, "watched key changed");
            }
        }
        state.view.clone()
    };

    let props = state
        .last_props
        .clone()
        .over(Props::new().with_context(view).with_version(state.version));
    state.target.render(&props);
}

// ═════════════════════════════════ Tests ════════════════════════════════════
