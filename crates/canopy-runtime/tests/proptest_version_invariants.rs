//! Property tests pitting the full delivery pipeline (channel → subscriber →
//! props) against a reference model of the versioning walk.
//!
//! Handles are modelled as integer tokens: reusing a handle keeps its token,
//! wrapping afresh allocates a new one. The model applies the documented
//! walk — watched keys in order, then the reserved update key — and the
//! wrapper must agree with it after every publish.

use std::cell::RefCell;
use std::collections::HashMap;
use std::iter;
use std::rc::Rc;

use canopy_core::{ContextMap, ContextValue, Props};
use canopy_runtime::{ContextChannel, FnComponent, SelectiveSubscriber, UPDATE_KEY};
use proptest::prelude::*;

/// One published entry: reuse the previous publish's handle for this key
/// (fresh when it had none) or wrap a fresh one.
#[derive(Clone, Debug)]
enum Entry {
    Keep,
    Fresh,
}

fn key_strategy() -> impl Strategy<Value = &'static str> {
    prop::sample::select(vec!["alpha", "beta", "gamma", UPDATE_KEY])
}

fn delivery_strategy() -> impl Strategy<Value = Vec<(&'static str, Entry)>> {
    prop::collection::vec(
        (
            key_strategy(),
            prop_oneof![Just(Entry::Keep), Just(Entry::Fresh)],
        ),
        0..5,
    )
}

proptest! {
    #[test]
    fn version_matches_reference_model(
        watched in prop::collection::vec(key_strategy(), 0..4),
        deliveries in prop::collection::vec(delivery_strategy(), 1..8),
    ) {
        let channel = ContextChannel::new();
        let seen: Rc<RefCell<Vec<(Option<u64>, ContextMap)>>> = Rc::new(RefCell::new(Vec::new()));
        let recording = {
            let seen = Rc::clone(&seen);
            FnComponent::new(move |props: &Props| {
                seen.borrow_mut()
                    .push((props.version(), props.context().unwrap().clone()));
            })
        };
        let connected = SelectiveSubscriber::new(&channel)
            .with_keys(watched.iter().copied())
            .wrap(recording);
        let stable_view = connected.view();
        let walk_len = watched.len() as u64 + 1;

        let mut next_token = 0u64;
        let mut previous_tokens: HashMap<&str, u64> = HashMap::new();
        let mut previous_handles: HashMap<&str, ContextValue> = HashMap::new();
        let mut model_cache: HashMap<&str, u64> = HashMap::new();
        let mut model_version = 0u64;
        let mut published = Vec::new();

        for delivery in &deliveries {
            let map = ContextMap::new();
            let mut tokens: HashMap<&str, u64> = HashMap::new();
            let mut handles: HashMap<&str, ContextValue> = HashMap::new();
            for (key, entry) in delivery {
                let (token, handle) = match entry {
                    Entry::Keep => match (previous_tokens.get(key), previous_handles.get(key)) {
                        (Some(token), Some(handle)) => (*token, handle.clone()),
                        _ => {
                            next_token += 1;
                            (next_token, ContextValue::new(next_token))
                        }
                    },
                    Entry::Fresh => {
                        next_token += 1;
                        (next_token, ContextValue::new(next_token))
                    }
                };
                map.insert(*key, handle.clone());
                tokens.insert(*key, token);
                handles.insert(*key, handle);
            }

            if !watched.is_empty() {
                for &key in watched.iter().chain(iter::once(&UPDATE_KEY)) {
                    let incoming = tokens.get(key).copied();
                    let cached = model_cache.get(key).copied();
                    if incoming != cached {
                        model_version += 1;
                        match incoming {
                            Some(token) => {
                                model_cache.insert(key, token);
                            }
                            None => {
                                model_cache.remove(key);
                            }
                        }
                    }
                }
            }

            let before = connected.version();
            channel.publish(map.clone());
            published.push(map);
            previous_tokens = tokens;
            previous_handles = handles;

            let after = connected.version();
            prop_assert_eq!(after, model_version);
            // One delivery can bump at most once per walked key.
            prop_assert!(after - before <= walk_len);
        }

        // Every publish produced exactly one render of the target.
        let seen = seen.borrow();
        prop_assert_eq!(seen.len(), deliveries.len());

        let mut last_version = 0u64;
        for (index, (version, context)) in seen.iter().enumerate() {
            if watched.is_empty() {
                // Passthrough: delivered map by handle, version pinned to 0.
                prop_assert_eq!(*version, Some(0));
                prop_assert!(context.same(&published[index]));
            } else {
                // Filtered: one stable view handle, monotone version.
                prop_assert!(context.same(&stable_view));
                let version = version.unwrap();
                prop_assert!(version >= last_version);
                last_version = version;
            }
        }
    }
}
