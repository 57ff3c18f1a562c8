#![forbid(unsafe_code)]

//! Core data model for canopy: identity-carrying value handles, shared
//! context maps, provider stores, and structured props.
//!
//! Everything in this crate is single-threaded by construction (`Rc`, not
//! `Arc`): a component tree lives on one thread, and the delivery layer in
//! `canopy-runtime` relies on that to mutate shared state without locks.
//!
//! # Design
//!
//! The whole model is built around one comparison: *handle identity*.
//! A [`ContextValue`] is an `Rc`-backed, type-erased handle; two handles
//! are "the same" iff they point at the same allocation. Change detection
//! downstream never looks at payloads, so:
//!
//! - re-wrapping an equal payload counts as a change, and
//! - mutating a payload behind a kept handle does not.
//!
//! Callers express "unchanged" by re-publishing the same handle. This is
//! cheap (pointer compare per key), predictable (no payload traversal), and
//! honest about what a shallow comparison can see.
//!
//! [`ContextMap`] is the reference-semantics map both delivery roles use: a
//! published value (rebuilt fresh per delivery) and a subscriber's cached
//! view (one handle for the subscriber's whole life, contents mutated in
//! place). [`Store`] is the provider-owned mutable state; [`StorePatch`] is
//! an ordered shallow update. [`Props`] is the structured bundle targets
//! render with.

pub mod map;
pub mod props;
pub mod store;
pub mod value;

pub use map::ContextMap;
pub use props::Props;
pub use store::{Store, StorePatch};
pub use value::ContextValue;
