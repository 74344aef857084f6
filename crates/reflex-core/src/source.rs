//! Observable value and event sources
//!
//! An [`ObservableValue`] is the explicit subscription contract trigger
//! watchers depend on: `subscribe` hands back a receiver of [`Change`]
//! notifications, `set` publishes the old/new pair to every subscriber.
//! An [`EventSource`] is the same idea without retained state - each
//! `emit` delivers a payload to every subscriber.

use std::sync::{PoisonError, RwLock};

use tokio::sync::broadcast;
use tracing::trace;

/// Default channel capacity for change subscriptions
const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// A single observed transition of an [`ObservableValue`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change<T> {
    /// Value before the transition
    pub old: T,
    /// Value after the transition
    pub new: T,
}

/// A mutable value that broadcasts every change to its subscribers
///
/// Watchers hold only the receiver returned by [`subscribe`](Self::subscribe);
/// they never own the source's lifetime. Publishing never blocks: if a
/// subscriber falls behind, it observes a lag error on its receiver instead
/// of stalling the writer.
pub struct ObservableValue<T> {
    current: RwLock<T>,
    sender: broadcast::Sender<Change<T>>,
}

impl<T> ObservableValue<T>
where
    T: Clone + Send + 'static,
{
    /// Create a source holding `initial`
    pub fn new(initial: T) -> Self {
        Self::with_capacity(initial, DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a source with a specific subscription channel capacity
    pub fn with_capacity(initial: T, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            current: RwLock::new(initial),
            sender,
        }
    }

    /// Snapshot the current value
    pub fn get(&self) -> T {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the value and notify subscribers with the old/new pair
    pub fn set(&self, value: T) {
        let old = {
            let mut guard = self
                .current
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *guard, value.clone())
        };

        trace!(subscribers = self.sender.receiver_count(), "value changed");

        // Send errors just mean nobody is listening right now
        let _ = self.sender.send(Change { old, new: value });
    }

    /// Subscribe to change notifications
    pub fn subscribe(&self) -> broadcast::Receiver<Change<T>> {
        self.sender.subscribe()
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// A typed event channel with no retained state
///
/// Every [`emit`](Self::emit) delivers the payload to all current
/// subscribers. Used by event triggers, which fire on every occurrence
/// rather than on a state transition.
pub struct EventSource<T> {
    sender: broadcast::Sender<T>,
}

impl<T> EventSource<T>
where
    T: Clone + Send + 'static,
{
    /// Create an event source
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create an event source with a specific channel capacity
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Deliver `payload` to every subscriber
    pub fn emit(&self, payload: T) {
        trace!(subscribers = self.sender.receiver_count(), "event emitted");
        let _ = self.sender.send(payload);
    }

    /// Subscribe to event occurrences
    pub fn subscribe(&self) -> broadcast::Receiver<T> {
        self.sender.subscribe()
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl<T> Default for EventSource<T>
where
    T: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
