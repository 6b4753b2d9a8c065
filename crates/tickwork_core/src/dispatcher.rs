//! # Event Dispatcher
//!
//! Named-event publish/subscribe for systems that must talk without holding
//! references to each other.
//!
//! ```text
//! "tick" ──> [cb 1] ──> [cb 2] ──> [cb 3]
//!                          │
//!                          └─ cancel() → cb 3 is skipped, dispatch returns true
//! ```
//!
//! Delivery within one event name follows subscription order. A subscriber
//! stops the rest of the chain through a [`Canceller`] it captured at
//! subscription time.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::entity::EntityId;

/// Identity attached to a subscription so it can be removed later.
///
/// Several subscriptions may share one identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Creates an identity from a raw value.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl From<u64> for SubscriberId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl From<EntityId> for SubscriberId {
    fn from(entity: EntityId) -> Self {
        Self(entity.raw())
    }
}

/// Handle that cancels the dispatch currently in progress.
///
/// The flag is shared by every dispatch of its dispatcher and reset at the
/// start of each one, so cancelling outside a dispatch has no effect.
#[derive(Clone, Debug, Default)]
pub struct Canceller {
    flag: Arc<AtomicBool>,
}

impl Canceller {
    /// Stops delivery after the current callback returns.
    #[inline]
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    #[inline]
    fn reset(&self) {
        self.flag.store(false, Ordering::Release);
    }

    #[inline]
    fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Subscriber callback: receives the event name and the payload.
pub type Callback<P> = Box<dyn FnMut(&str, &P) + Send>;

struct Subscription<P> {
    id: Option<SubscriberId>,
    callback: Callback<P>,
}

/// Registry of event names to ordered subscriptions.
///
/// `dispatch` takes `&mut self`, so the table cannot change while a dispatch
/// is running. Callers that share a dispatcher across threads serialize
/// subscribe and dispatch with their own lock.
///
/// # Example
///
/// ```rust,ignore
/// let mut events: Dispatcher<u64> = Dispatcher::new();
/// let stop = events.canceller();
/// events.subscribe_id("damage", player.into(), move |_, hp| {
///     if *hp == 0 { stop.cancel(); }
/// });
/// let cancelled = events.dispatch("damage", &0);
/// ```
pub struct Dispatcher<P> {
    /// Event name to subscriptions, in subscription order.
    events: HashMap<String, Vec<Subscription<P>>>,
    /// Shared cancellation flag for the dispatch in progress.
    cancel: Canceller,
}

impl<P> Dispatcher<P> {
    /// Creates an empty dispatcher.
    #[must_use]
    pub fn new() -> Self {
        Self {
            events: HashMap::new(),
            cancel: Canceller::default(),
        }
    }

    /// Subscribes anonymously. The subscription cannot be removed by id.
    pub fn subscribe<F>(&mut self, event: &str, callback: F)
    where
        F: FnMut(&str, &P) + Send + 'static,
    {
        self.push(event, None, Box::new(callback));
    }

    /// Subscribes under `id` so the subscription can be removed later.
    pub fn subscribe_id<F>(&mut self, event: &str, id: SubscriberId, callback: F)
    where
        F: FnMut(&str, &P) + Send + 'static,
    {
        self.push(event, Some(id), Box::new(callback));
    }

    fn push(&mut self, event: &str, id: Option<SubscriberId>, callback: Callback<P>) {
        self.events
            .entry(event.to_owned())
            .or_default()
            .push(Subscription { id, callback });
    }

    /// Removes every subscription to `event` made under `id`.
    ///
    /// Survivors keep their relative order. Returns the number removed;
    /// an unknown event or id removes nothing.
    pub fn unsubscribe_id(&mut self, event: &str, id: SubscriberId) -> usize {
        let Some(subs) = self.events.get_mut(event) else {
            return 0;
        };

        let before = subs.len();
        subs.retain(|sub| sub.id != Some(id));
        let removed = before - subs.len();

        if subs.is_empty() {
            self.events.remove(event);
        }
        tracing::trace!(event, removed, "unsubscribed");
        removed
    }

    /// Delivers `payload` to every subscriber of `event` in order.
    ///
    /// Returns true if a subscriber cancelled the dispatch, false otherwise
    /// (including when nobody is subscribed).
    pub fn dispatch(&mut self, event: &str, payload: &P) -> bool {
        let Some(subs) = self.events.get_mut(event) else {
            return false;
        };

        self.cancel.reset();
        for sub in subs.iter_mut() {
            (sub.callback)(event, payload);
            if self.cancel.is_cancelled() {
                tracing::trace!(event, "dispatch cancelled");
                return true;
            }
        }
        false
    }

    /// Cancels the dispatch in progress.
    ///
    /// Only meaningful from inside a callback; subscribers usually hold a
    /// [`Canceller`] instead since they cannot borrow the dispatcher.
    pub fn cancel_dispatch(&self) {
        self.cancel.cancel();
    }

    /// Returns a handle subscribers can capture to cancel a dispatch.
    #[must_use]
    pub fn canceller(&self) -> Canceller {
        self.cancel.clone()
    }

    /// Drops every subscription for every event.
    pub fn clear_subscriptions(&mut self) {
        self.events.clear();
    }

    /// Returns the number of subscriptions to `event`.
    #[must_use]
    pub fn subscriber_count(&self, event: &str) -> usize {
        self.events.get(event).map_or(0, Vec::len)
    }

    /// Iterates over event names that have at least one subscriber.
    pub fn events(&self) -> impl Iterator<Item = &str> {
        self.events.keys().map(String::as_str)
    }
}

impl<P> Default for Dispatcher<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> fmt::Debug for Dispatcher<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.events.iter().map(|(name, subs)| (name, subs.len())))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn recorder(log: &Arc<Mutex<Vec<&'static str>>>, tag: &'static str) -> impl FnMut(&str, &u32) + Send {
        let log = Arc::clone(log);
        move |_, _| log.lock().unwrap().push(tag)
    }

    #[test]
    fn test_unsubscribe_by_identity() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = SubscriberId::new(1);
        let b = SubscriberId::new(2);

        let mut events: Dispatcher<u32> = Dispatcher::new();
        events.subscribe_id("tick", a, recorder(&log, "a1"));
        events.subscribe_id("tick", b, recorder(&log, "b"));
        events.subscribe_id("tick", a, recorder(&log, "a2"));

        assert_eq!(events.unsubscribe_id("tick", a), 2);
        assert_eq!(events.subscriber_count("tick"), 1);

        assert!(!events.dispatch("tick", &0));
        assert_eq!(*log.lock().unwrap(), vec!["b"]);
    }

    #[test]
    fn test_unsubscribe_unknown_is_zero() {
        let mut events: Dispatcher<u32> = Dispatcher::new();
        assert_eq!(events.unsubscribe_id("missing", SubscriberId::new(1)), 0);

        events.subscribe("tick", |_, _| {});
        assert_eq!(events.unsubscribe_id("tick", SubscriberId::new(9)), 0);
        assert_eq!(events.subscriber_count("tick"), 1);
    }

    #[test]
    fn test_cancel_stops_chain() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut events: Dispatcher<u32> = Dispatcher::new();

        let armed = Arc::new(AtomicBool::new(true));
        let stop = events.canceller();
        let second_log = Arc::clone(&log);
        let second_armed = Arc::clone(&armed);

        events.subscribe("x", recorder(&log, "first"));
        events.subscribe("x", move |_, _| {
            second_log.lock().unwrap().push("second");
            if second_armed.load(Ordering::SeqCst) {
                stop.cancel();
            }
        });
        events.subscribe("x", recorder(&log, "third"));

        assert!(events.dispatch("x", &7));
        assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);

        log.lock().unwrap().clear();
        armed.store(false, Ordering::SeqCst);
        assert!(!events.dispatch("x", &7));
        assert_eq!(*log.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_cancel_outside_dispatch_is_reset() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut events: Dispatcher<u32> = Dispatcher::new();
        events.subscribe("x", recorder(&log, "one"));
        events.subscribe("x", recorder(&log, "two"));

        events.cancel_dispatch();
        assert!(!events.dispatch("x", &1));
        assert_eq!(log.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_dispatch_without_subscribers() {
        let mut events: Dispatcher<u32> = Dispatcher::new();
        assert!(!events.dispatch("nobody", &1));
    }

    #[test]
    fn test_callback_sees_name_and_payload() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut events: Dispatcher<String> = Dispatcher::new();
        events.subscribe("spawn", move |name, payload| {
            sink.lock().unwrap().push(format!("{name}:{payload}"));
        });

        events.dispatch("spawn", &"orc".to_owned());
        assert_eq!(*seen.lock().unwrap(), vec!["spawn:orc".to_owned()]);
    }

    #[test]
    fn test_clear_subscriptions() {
        let mut events: Dispatcher<u32> = Dispatcher::new();
        events.subscribe("a", |_, _| {});
        events.subscribe_id("b", EntityId::from_raw(3).into(), |_, _| {});
        assert_eq!(events.events().count(), 2);

        events.clear_subscriptions();
        assert_eq!(events.events().count(), 0);
        assert_eq!(events.subscriber_count("a"), 0);
    }
}
