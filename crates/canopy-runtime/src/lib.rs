#![forbid(unsafe_code)]

//! Delivery layer for canopy: the context channel, the component seam, and
//! the two wrapper factories.
//!
//! # Design
//!
//! The flow is a straight line:
//!
//! ```text
//! StoreProvider ──publish──▶ ContextChannel ──deliver──▶ SelectiveSubscriber
//!      │                                                        │
//!      ▼                                                        ▼
//!   target.render(props)                        target.render(view + version)
//! ```
//!
//! A [`StoreProvider`] wraps a target component with an owned store; each
//! render (and each update through its [`UpdateHandle`]) publishes a fresh
//! map of the store's entries plus the handle itself under the reserved
//! [`UPDATE_KEY`]. A [`SelectiveSubscriber`] wraps a target with a watch
//! list; each delivery walks the watched keys, counts identity changes into
//! a monotone version, folds changed handles into a cached view whose own
//! identity never changes, and renders the target with `{view, version}`
//! under any externally supplied props.
//!
//! The [`ContextChannel`] between them is deliberately explicit — no
//! ambient tree context. Tests publish arbitrary maps directly, and the
//! channel's FIFO queue makes updates issued mid-delivery safe.
//!
//! Everything is single-threaded (`Rc`/`RefCell`, as in `canopy-core`).

pub mod channel;
pub mod component;
pub mod provider;
pub mod subscriber;

pub use channel::{ContextChannel, Subscription};
pub use component::{Component, FnComponent, Memo};
pub use provider::{Provided, StoreProvider, UPDATE_KEY, UpdateHandle};
pub use subscriber::{Connected, SelectiveSubscriber, WatchedKeys};
