#![forbid(unsafe_code)]

//! Canopy public facade crate.
//!
//! This crate provides the stable, ergonomic surface area for users.

pub mod prelude {
    pub use canopy_core as core;
    pub use canopy_runtime as runtime;

    pub use canopy_core::{ContextMap, ContextValue, Props, Store, StorePatch};
    pub use canopy_runtime::{
        Component, Connected, ContextChannel, FnComponent, Memo, Provided, SelectiveSubscriber,
        StoreProvider, Subscription, UPDATE_KEY, UpdateHandle, WatchedKeys,
    };
}
