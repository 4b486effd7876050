//! Named-channel event broker.
//!
//! The broker maps an event name to an ordered list of listeners. Publishing
//! invokes every listener registered under that name, synchronously and in
//! registration order, and tells the publisher whether anyone was listening.

use hashbrown::HashMap;
use parking_lot::RwLock;
use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::Arc;

/// Trait for listening to broker events.
pub trait EventListener<E>: Send + Sync {
    /// Called when an event is published on a channel this listener is subscribed to.
    fn on_event(&self, event: &E);
}

/// Type alias for boxed event listeners.
pub type BoxedEventListener<E> = Arc<dyn EventListener<E>>;

/// A publish/subscribe broker keyed by event name.
///
/// Subscribing takes `&self`, so a broker shared behind an `Arc` can gain
/// listeners at any time. The listener list is snapshotted before it is
/// invoked, which means listeners may subscribe or publish re-entrantly.
///
/// A panicking listener is not caught: the panic unwinds into the caller of
/// [`publish`](EventBroker::publish), and listeners after it are skipped.
///
/// # Examples
///
/// ```
/// use resilient_stream_core::EventBroker;
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// let hits = Arc::new(AtomicUsize::new(0));
/// let broker: EventBroker<&'static str, u32> = EventBroker::new();
///
/// let h = Arc::clone(&hits);
/// broker.subscribe_fn("tick", move |n: &u32| {
///     h.fetch_add(*n as usize, Ordering::SeqCst);
/// });
///
/// assert!(broker.publish("tick", &3));
/// assert!(!broker.publish("tock", &3));
/// assert_eq!(hits.load(Ordering::SeqCst), 3);
/// ```
pub struct EventBroker<K, E> {
    channels: RwLock<HashMap<K, Vec<BoxedEventListener<E>>>>,
}

impl<K, E> EventBroker<K, E>
where
    K: Eq + Hash + Copy,
{
    /// Creates a broker with no channels.
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a listener on the named channel.
    ///
    /// Returns `&self` so registrations can be chained.
    pub fn subscribe<L>(&self, name: K, listener: L) -> &Self
    where
        L: EventListener<E> + 'static,
    {
        self.subscribe_boxed(name, Arc::new(listener))
    }

    /// Registers an already boxed listener on the named channel.
    pub fn subscribe_boxed(&self, name: K, listener: BoxedEventListener<E>) -> &Self {
        self.channels.write().entry(name).or_default().push(listener);
        self
    }

    /// Registers a closure on the named channel.
    pub fn subscribe_fn<F>(&self, name: K, f: F) -> &Self
    where
        F: Fn(&E) + Send + Sync + 'static,
        E: 'static,
    {
        self.subscribe(name, FnListener::new(f))
    }

    /// Publishes an event on the named channel.
    ///
    /// Returns `true` if at least one listener received it, `false` if the
    /// channel had no listeners (in which case nothing happens).
    pub fn publish(&self, name: K, event: &E) -> bool {
        let listeners = match self.channels.read().get(&name) {
            Some(listeners) if !listeners.is_empty() => listeners.clone(),
            _ => return false,
        };

        for listener in &listeners {
            listener.on_event(event);
        }
        true
    }

    /// Returns the number of listeners registered on the named channel.
    pub fn listener_count(&self, name: K) -> usize {
        self.channels.read().get(&name).map_or(0, Vec::len)
    }

    /// Returns true if the named channel has at least one listener.
    pub fn has_listeners(&self, name: K) -> bool {
        self.listener_count(name) > 0
    }

    /// Removes every listener from every channel.
    pub fn clear(&self) {
        self.channels.write().clear();
    }
}

impl<K, E> Default for EventBroker<K, E>
where
    K: Eq + Hash + Copy,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, E> fmt::Debug for EventBroker<K, E>
where
    K: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let channels = self.channels.read();
        let mut map = f.debug_map();
        for (name, listeners) in channels.iter() {
            map.entry(name, &listeners.len());
        }
        map.finish()
    }
}

/// A simple function-based event listener.
pub struct FnListener<E, F>
where
    F: Fn(&E) + Send + Sync,
{
    f: F,
    _phantom: PhantomData<fn(&E)>,
}

impl<E, F> FnListener<E, F>
where
    F: Fn(&E) + Send + Sync,
{
    /// Creates a new function-based listener.
    pub fn new(f: F) -> Self {
        Self {
            f,
            _phantom: PhantomData,
        }
    }
}

impl<E, F> EventListener<E> for FnListener<E, F>
where
    F: Fn(&E) + Send + Sync,
{
    fn on_event(&self, event: &E) {
        (self.f)(event)
    }
}
