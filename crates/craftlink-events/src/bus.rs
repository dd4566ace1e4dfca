use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

type ErasedHandler = Arc<dyn Fn(&dyn Any) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    handler: ErasedHandler,
}

#[derive(Default)]
struct BusInner {
    next_id: u64,
    handlers: HashMap<TypeId, Vec<Subscription>>,
}

/// Synchronous publish/subscribe registry keyed by event type.
///
/// Handlers for a type run in registration order on the publisher's thread.
/// The handler list is copied out before dispatch, so a handler may publish
/// or (un)subscribe without deadlocking; such changes apply from the next
/// publish onwards.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Mutex<BusInner>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<E: 'static>(
        &self,
        handler: impl Fn(&E) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let erased: ErasedHandler = Arc::new(move |event: &dyn Any| {
            if let Some(event) = event.downcast_ref::<E>() {
                handler(event);
            }
        });
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let id = SubscriptionId(inner.next_id);
        inner
            .handlers
            .entry(TypeId::of::<E>())
            .or_default()
            .push(Subscription {
                id,
                handler: erased,
            });
        trace!(event = type_name::<E>(), ?id, "subscribed");
        id
    }

    /// Remove a handler. Unknown ids are ignored; returns whether one was removed.
    pub fn unsubscribe<E: 'static>(&self, id: SubscriptionId) -> bool {
        let mut inner = self.inner.lock();
        let Some(subscriptions) = inner.handlers.get_mut(&TypeId::of::<E>()) else {
            return false;
        };
        let before = subscriptions.len();
        subscriptions.retain(|s| s.id != id);
        before != subscriptions.len()
    }

    /// Deliver `event` to every handler registered for `E`. Returns the
    /// number of handlers invoked; zero subscribers is not an error.
    pub fn publish<E: 'static>(&self, event: &E) -> usize {
        let handlers: Vec<ErasedHandler> = {
            let inner = self.inner.lock();
            match inner.handlers.get(&TypeId::of::<E>()) {
                Some(subscriptions) => subscriptions.iter().map(|s| s.handler.clone()).collect(),
                None => return 0,
            }
        };
        for handler in &handlers {
            handler(event);
        }
        trace!(event = type_name::<E>(), delivered = handlers.len(), "published");
        handlers.len()
    }

    pub fn subscriber_count<E: 'static>(&self) -> usize {
        self.inner
            .lock()
            .handlers
            .get(&TypeId::of::<E>())
            .map_or(0, Vec::len)
    }

    /// Drop every subscription.
    pub fn clear(&self) {
        self.inner.lock().handlers.clear();
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        let total: usize = inner.handlers.values().map(Vec::len).sum();
        f.debug_struct("EventBus")
            .field("event_types", &inner.handlers.len())
            .field("subscriptions", &total)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Ping(u32);

    #[derive(Debug)]
    struct Pong;

    #[test]
    fn handlers_run_in_registration_order() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for tag in ["a", "b", "c"] {
            let seen = seen.clone();
            bus.subscribe(move |ping: &Ping| seen.lock().push(format!("{tag}{}", ping.0)));
        }
        assert_eq!(bus.publish(&Ping(1)), 3);
        assert_eq!(*seen.lock(), vec!["a1", "b1", "c1"]);
    }

    #[test]
    fn publish_without_subscribers_is_noop() {
        let bus = EventBus::new();
        bus.subscribe(|_: &Ping| {});
        assert_eq!(bus.publish(&Pong), 0);
    }

    #[test]
    fn unsubscribe_removes_only_that_handler() {
        let bus = EventBus::new();
        let count = Arc::new(Mutex::new(0));
        let first = {
            let count = count.clone();
            bus.subscribe(move |_: &Ping| *count.lock() += 1)
        };
        let _second = {
            let count = count.clone();
            bus.subscribe(move |_: &Ping| *count.lock() += 10)
        };
        assert!(bus.unsubscribe::<Ping>(first));
        assert!(!bus.unsubscribe::<Ping>(first));
        assert!(!bus.unsubscribe::<Pong>(first));
        bus.publish(&Ping(0));
        assert_eq!(*count.lock(), 10);
    }

    #[test]
    fn handler_may_publish_reentrantly() {
        let bus = EventBus::new();
        let pongs = Arc::new(Mutex::new(0));
        {
            let bus2 = bus.clone();
            bus.subscribe(move |_: &Ping| {
                bus2.publish(&Pong);
            });
        }
        {
            let pongs = pongs.clone();
            bus.subscribe(move |_: &Pong| *pongs.lock() += 1);
        }
        bus.publish(&Ping(7));
        assert_eq!(*pongs.lock(), 1);
    }

    #[test]
    fn clear_drops_all_subscriptions() {
        let bus = EventBus::new();
        bus.subscribe(|_: &Ping| {});
        bus.subscribe(|_: &Pong| {});
        bus.clear();
        assert_eq!(bus.subscriber_count::<Ping>(), 0);
        assert_eq!(bus.publish(&Ping(1)), 0);
    }
}
