#![forbid(unsafe_code)]

//! Delivery channel: the explicit stand-in for a host framework's ambient
//! context mechanism.
//!
//! A [`ContextChannel`] carries the capability pair the wrappers split
//! between them:
//!
//! - **expose** — [`publish`](ContextChannel::publish) delivers a
//!   [`ContextMap`] to every live subscriber and retains it as
//!   [`current`](ContextChannel::current);
//! - **consume** — [`subscribe`](ContextChannel::subscribe) registers a
//!   delivery callback and returns an RAII [`Subscription`].
//!
//! # Invariants
//!
//! 1. Subscribers are notified in registration order.
//! 2. A publish issued while a notification pass is in flight is queued and
//!    delivered after the pass completes: every subscriber observes value N
//!    before any subscriber observes value N+1.
//! 3. Dropping a [`Subscription`] removes its callback eagerly; a pass that
//!    already snapshotted may still invoke it once.
//! 4. Callbacks are held weakly by the channel and pruned during
//!    notification; the strong reference lives in the `Subscription`.
//! 5. A subscription created mid-pass first hears the next delivered value;
//!    it can read [`current`](ContextChannel::current) immediately.
//!
//! # Failure Modes
//!
//! - **Delivery callback panics**: The panic propagates to the publisher.
//!   Remaining callbacks in that pass are skipped and queued values are
//!   discarded, but the pass flag is reset during the unwind, so the next
//!   publish delivers normally. [`current`](ContextChannel::current) still
//!   reflects the most recent publish, delivered or not.
//! - **Subscriber dropped mid-pass**: The snapshot taken at pass start may
//!   invoke its callback one final time (invariant 3); later passes never
//!   do.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{debug, trace};

use canopy_core::ContextMap;

type DeliveryFn = dyn Fn(&ContextMap);

// ───────────────────────────── ContextChannel ───────────────────────────────

struct SubscriberSlot {
    id: u64,
    callback: Weak<DeliveryFn>,
}

#[derive(Default)]
struct ChannelInner {
    current: Option<ContextMap>,
    subscribers: Vec<SubscriberSlot>,
    /// Values published while a notification pass was running, oldest first.
    queued: VecDeque<ContextMap>,
    notifying: bool,
    next_id: u64,
}

/// Ends the notification pass when dropped, including during an unwind out
/// of a delivery callback. Values still queued when a pass is abandoned are
/// discarded rather than replayed into a later pass.
struct PassGuard {
    inner: Rc<RefCell<ChannelInner>>,
}

impl Drop for PassGuard {
    fn drop(&mut self) {
        let mut inner = self.inner.borrow_mut();
        inner.notifying = false;
        if !inner.queued.is_empty() {
            debug!(discarded = inner.queued.len(), "pass abandoned, discarding queued values");
            inner.queued.clear();
        }
    }
}

/// Shared delivery channel. Clones are handles onto one channel.
#[derive(Clone, Default)]
pub struct ContextChannel {
    inner: Rc<RefCell<ChannelInner>>,
}

impl ContextChannel {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `value` to every live subscriber, in registration order, and
    /// retain it as [`current`](Self::current).
    ///
    /// Re-entrant publishes (from inside a delivery callback) are queued
    /// and drained in FIFO order once the running pass finishes, so every
    /// subscriber sees the same sequence of values.
    ///
    /// A panicking callback abandons the pass: remaining deliveries and any
    /// queued values are skipped and the panic propagates, but the channel
    /// stays usable for later publishes.
    pub fn publish(&self, value: ContextMap) {
        {
            let mut inner = self.inner.borrow_mut();
            inner.current = Some(value.clone());
            if inner.notifying {
                inner.queued.push_back(value);
                trace!(queued = inner.queued.len(), "publish during pass, queued");
                return;
            }
            inner.notifying = true;
        }
        let _pass = PassGuard {
            inner: Rc::clone(&self.inner),
        };

        let mut next = Some(value);
        while let Some(value) = next {
            let callbacks = self.live_callbacks();
            debug!(subscribers = callbacks.len(), "delivering context value");
            for callback in &callbacks {
                callback(&value);
            }
            next = self.inner.borrow_mut().queued.pop_front();
        }
    }

    /// Prune dead slots and snapshot the live callbacks. The snapshot holds
    /// strong references for the duration of one pass, so a callback being
    /// invoked cannot be freed mid-call by an unsubscribe.
    fn live_callbacks(&self) -> Vec<Rc<DeliveryFn>> {
        let mut inner = self.inner.borrow_mut();
        inner
            .subscribers
            .retain(|slot| slot.callback.strong_count() > 0);
        inner
            .subscribers
            .iter()
            .filter_map(|slot| slot.callback.upgrade())
            .collect()
    }

    /// Register a delivery callback. The callback stays live until the
    /// returned [`Subscription`] is dropped.
    pub fn subscribe(&self, callback: impl Fn(&ContextMap) + 'static) -> Subscription {
        let callback: Rc<DeliveryFn> = Rc::new(callback);
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.subscribers.push(SubscriberSlot {
            id,
            callback: Rc::downgrade(&callback),
        });
        trace!(id, total = inner.subscribers.len(), "subscriber registered");
        Subscription {
            channel: Rc::downgrade(&self.inner),
            id,
            _callback: callback,
        }
    }

    /// The most recently published value, if any.
    #[must_use]
    pub fn current(&self) -> Option<ContextMap> {
        self.inner.borrow().current.clone()
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .borrow()
            .subscribers
            .iter()
            .filter(|slot| slot.callback.strong_count() > 0)
            .count()
    }
}

impl fmt::Debug for ContextChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("ContextChannel")
            .field("subscribers", &inner.subscribers.len())
            .field("has_current", &inner.current.is_some())
            .field("queued", &inner.queued.len())
            .finish()
    }
}

// ───────────────────────────── Subscription ─────────────────────────────────

/// RAII handle for one registered delivery callback.
///
/// Dropping it unsubscribes eagerly (and releases the only strong reference
/// to the callback, so a channel outliving its subscriptions holds no live
/// slots).
#[must_use = "dropping the subscription unsubscribes immediately"]
pub struct Subscription {
    channel: Weak<RefCell<ChannelInner>>,
    id: u64,
    /// Sole strong reference to the delivery callback.
    _callback: Rc<DeliveryFn>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.channel.upgrade() {
            let mut inner = inner.borrow_mut();
            inner.subscribers.retain(|slot| slot.id != self.id);
            trace!(id = self.id, "subscriber removed");
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

// ═════════════════════════════════ Tests ════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_core::ContextValue;

    fn tagged(tag: u32) -> ContextMap {
        let map = ContextMap::new();
        map.insert("tag", ContextValue::new(tag));
        map
    }

    fn tag_of(map: &ContextMap) -> u32 {
        *map.get("tag")
            .unwrap()
            .downcast_ref::<u32>()
            .unwrap()
    }

    #[test]
    fn publish_reaches_subscribers_in_registration_order() {
        let channel = ContextChannel::new();
        let order = Rc::new(RefCell::new(Vec::new()));

        let first = {
            let order = Rc::clone(&order);
            channel.subscribe(move |_| order.borrow_mut().push("first"))
        };
        let second = {
            let order = Rc::clone(&order);
            channel.subscribe(move |_| order.borrow_mut().push("second"))
        };

        channel.publish(tagged(1));
        assert_eq!(*order.borrow(), ["first", "second"]);
        drop(first);
        drop(second);
    }

    #[test]
    fn current_retains_the_latest_value() {
        let channel = ContextChannel::new();
        assert!(channel.current().is_none());

        let value = tagged(7);
        channel.publish(value.clone());
        assert!(channel.current().unwrap().same(&value));

        let newer = tagged(8);
        channel.publish(newer.clone());
        assert!(channel.current().unwrap().same(&newer));
    }

    #[test]
    fn dropping_subscription_stops_delivery() {
        let channel = ContextChannel::new();
        let count = Rc::new(RefCell::new(0u32));

        let sub = {
            let count = Rc::clone(&count);
            channel.subscribe(move |_| *count.borrow_mut() += 1)
        };
        channel.publish(tagged(1));
        assert_eq!(*count.borrow(), 1);
        assert_eq!(channel.subscriber_count(), 1);

        drop(sub);
        assert_eq!(channel.subscriber_count(), 0);
        channel.publish(tagged(2));
        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn publish_during_pass_is_queued_fifo() {
        let channel = ContextChannel::new();
        let seen_a = Rc::new(RefCell::new(Vec::new()));
        let seen_b = Rc::new(RefCell::new(Vec::new()));

        // First subscriber republishes once, from inside the first pass.
        let a = {
            let channel = channel.clone();
            let seen = Rc::clone(&seen_a);
            channel.clone().subscribe(move |map| {
                let tag = tag_of(map);
                seen.borrow_mut().push(tag);
                if tag == 1 {
                    channel.publish(tagged(2));
                }
            })
        };
        let b = {
            let seen = Rc::clone(&seen_b);
            channel.subscribe(move |map| seen.borrow_mut().push(tag_of(map)))
        };

        channel.publish(tagged(1));

        // Both subscribers saw 1 before either saw 2.
        assert_eq!(*seen_a.borrow(), [1, 2]);
        assert_eq!(*seen_b.borrow(), [1, 2]);
        drop(a);
        drop(b);
    }

    #[test]
    fn current_is_updated_immediately_even_when_queued() {
        let channel = ContextChannel::new();
        let observed = Rc::new(RefCell::new(Vec::new()));

        let sub = {
            let channel = channel.clone();
            let observed = Rc::clone(&observed);
            channel.clone().subscribe(move |map| {
                let tag = tag_of(map);
                if tag == 1 {
                    channel.publish(tagged(2));
                    // The queued value is already `current`.
                    observed
                        .borrow_mut()
                        .push(tag_of(&channel.current().unwrap()));
                }
            })
        };

        channel.publish(tagged(1));
        assert_eq!(*observed.borrow(), [2]);
        drop(sub);
    }

    #[test]
    fn unsubscribe_from_inside_own_callback() {
        let channel = ContextChannel::new();
        let count = Rc::new(RefCell::new(0u32));
        let slot: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));

        let sub = {
            let count = Rc::clone(&count);
            let slot = Rc::clone(&slot);
            channel.subscribe(move |_| {
                *count.borrow_mut() += 1;
                // Self-unsubscribe on first delivery.
                slot.borrow_mut().take();
            })
        };
        *slot.borrow_mut() = Some(sub);

        channel.publish(tagged(1));
        channel.publish(tagged(2));
        assert_eq!(*count.borrow(), 1);
        assert_eq!(channel.subscriber_count(), 0);
    }

    #[test]
    fn subscription_outliving_channel_drops_cleanly() {
        let channel = ContextChannel::new();
        let sub = channel.subscribe(|_| {});
        drop(channel);
        drop(sub); // must not panic
    }

    #[test]
    fn subscriber_added_mid_pass_hears_queued_values() {
        let channel = ContextChannel::new();
        let late_seen = Rc::new(RefCell::new(Vec::new()));
        let late_slot: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));

        let sub = {
            let channel = channel.clone();
            let late_seen = Rc::clone(&late_seen);
            let late_slot = Rc::clone(&late_slot);
            channel.clone().subscribe(move |map| {
                if tag_of(map) == 1 {
                    // Register a new subscriber and queue a second value
                    // from inside the first pass.
                    let seen = Rc::clone(&late_seen);
                    *late_slot.borrow_mut() =
                        Some(channel.subscribe(move |m| seen.borrow_mut().push(tag_of(m))));
                    channel.publish(tagged(2));
                }
            })
        };

        channel.publish(tagged(1));
        // The late subscriber missed value 1 but heard the queued value 2.
        assert_eq!(*late_seen.borrow(), [2]);
        drop(sub);
    }

    #[test]
    fn publish_recovers_after_callback_panic() {
        use std::panic::{AssertUnwindSafe, catch_unwind};

        let channel = ContextChannel::new();
        let count = Rc::new(RefCell::new(0u32));

        let healthy = {
            let count = Rc::clone(&count);
            channel.subscribe(move |_| *count.borrow_mut() += 1)
        };
        let faulty = channel.subscribe(|_| panic!("target render failed"));

        let outcome = catch_unwind(AssertUnwindSafe(|| channel.publish(tagged(1))));
        assert!(outcome.is_err());
        assert_eq!(*count.borrow(), 1);

        // The failed pass must not block later publishes.
        drop(faulty);
        channel.publish(tagged(2));
        assert_eq!(*count.borrow(), 2);
        assert_eq!(tag_of(&channel.current().unwrap()), 2);
        drop(healthy);
    }

    #[test]
    fn queued_values_die_with_an_abandoned_pass() {
        use std::panic::{AssertUnwindSafe, catch_unwind};

        let channel = ContextChannel::new();
        let seen = Rc::new(RefCell::new(Vec::new()));

        // Queues a follow-up value, then unwinds before the pass drains it.
        let faulty = {
            let channel = channel.clone();
            channel.clone().subscribe(move |map| {
                if tag_of(map) == 1 {
                    channel.publish(tagged(2));
                    panic!("target render failed");
                }
            })
        };
        let watcher = {
            let seen = Rc::clone(&seen);
            channel.subscribe(move |map| seen.borrow_mut().push(tag_of(map)))
        };

        let outcome = catch_unwind(AssertUnwindSafe(|| channel.publish(tagged(1))));
        assert!(outcome.is_err());
        // Retained but never delivered.
        assert_eq!(tag_of(&channel.current().unwrap()), 2);

        drop(faulty);
        channel.publish(tagged(3));
        assert_eq!(*seen.borrow(), [3]);
        drop(watcher);
    }
}
