//! Topic-keyed publish/subscribe with last-value replay.
//!
//! The bus delivers every published payload synchronously to the
//! current subscribers of its topic, in subscription order. A topic
//! remembers the last payload published on it; subscribing with
//! `replay = true` hands that payload to the new observer immediately,
//! before `subscribe` returns. No ordering guarantee exists across
//! topics.
//!
//! Observers are fallible. A failing observer is reported via
//! `tracing::warn!` and never prevents delivery to the observers
//! registered after it.
//!
//! The subscriber registry tolerates re-entrant calls: observers are
//! invoked on a snapshot taken outside the registry lock, so an
//! observer may subscribe, cancel, or publish from inside its own
//! invocation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use thiserror::Error;
use tracing::warn;

/// Failure reported by an observer back to the bus.
///
/// The bus logs it and moves on; it is never propagated to the
/// publisher.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ObserverError(String);

impl ObserverError {
    /// Create an observer error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Observer callback type for a bus carrying payloads of type `T`.
pub type Observer<T> = Arc<dyn Fn(&T) -> Result<(), ObserverError> + Send + Sync>;

struct TopicState<T> {
    observers: Vec<(u64, Observer<T>)>,
    last: Option<T>,
}

impl<T> TopicState<T> {
    fn new() -> Self {
        Self {
            observers: Vec::new(),
            last: None,
        }
    }
}

struct BusInner<T> {
    topics: HashMap<String, TopicState<T>>,
    next_id: u64,
}

/// A publish/subscribe bus with last-value replay.
///
/// Cloning the bus is cheap and yields a handle to the same subscriber
/// registry.
#[derive(Clone)]
pub struct EventBus<T: Clone> {
    inner: Arc<Mutex<BusInner<T>>>,
}

impl<T: Clone> EventBus<T> {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(BusInner {
                topics: HashMap::new(),
                next_id: 0,
            })),
        }
    }

    /// Publish a payload on a topic.
    ///
    /// The payload is recorded as the topic's last value (even when the
    /// topic has no subscribers yet) and then delivered synchronously
    /// to every current subscriber, in subscription order. Observer
    /// failures are logged and skipped.
    pub fn publish(&self, topic: &str, payload: T) {
        let snapshot: Vec<(u64, Observer<T>)> = {
            let mut inner = self.inner.lock().expect("bus lock poisoned");
            let state = inner
                .topics
                .entry(topic.to_string())
                .or_insert_with(TopicState::new);
            state.last = Some(payload.clone());
            state.observers.clone()
        };

        for (id, observer) in snapshot {
            if let Err(error) = observer(&payload) {
                warn!(topic, observer = id, %error, "observer failed; continuing delivery");
            }
        }
    }

    /// Register an observer on a topic.
    ///
    /// When `replay` is true and a payload was previously published on
    /// the topic, the observer is invoked with that payload before this
    /// call returns. The returned [`Subscription`] cancels the
    /// registration; dropping it without cancelling leaves the observer
    /// registered for the lifetime of the bus.
    pub fn subscribe(&self, topic: &str, observer: Observer<T>, replay: bool) -> Subscription<T> {
        let (id, replayed) = {
            let mut inner = self.inner.lock().expect("bus lock poisoned");
            let id = inner.next_id;
            inner.next_id += 1;
            let state = inner
                .topics
                .entry(topic.to_string())
                .or_insert_with(TopicState::new);
            state.observers.push((id, observer.clone()));
            let replayed = if replay { state.last.clone() } else { None };
            (id, replayed)
        };

        if let Some(payload) = replayed {
            if let Err(error) = observer(&payload) {
                warn!(topic, observer = id, %error, "observer failed during replay");
            }
        }

        Subscription {
            bus: Arc::downgrade(&self.inner),
            topic: topic.to_string(),
            id,
        }
    }

    /// Last payload published on a topic, if any.
    pub fn last(&self, topic: &str) -> Option<T> {
        let inner = self.inner.lock().expect("bus lock poisoned");
        inner.topics.get(topic).and_then(|state| state.last.clone())
    }

    /// Number of observers currently registered on a topic.
    pub fn observer_count(&self, topic: &str) -> usize {
        let inner = self.inner.lock().expect("bus lock poisoned");
        inner
            .topics
            .get(topic)
            .map(|state| state.observers.len())
            .unwrap_or(0)
    }
}

impl<T: Clone> Default for EventBus<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to an active observer registration.
#[must_use = "dropping a Subscription without cancelling leaves the observer registered"]
pub struct Subscription<T: Clone> {
    bus: Weak<Mutex<BusInner<T>>>,
    topic: String,
    id: u64,
}

impl<T: Clone> Subscription<T> {
    /// Remove the observer from the bus.
    ///
    /// A no-op if the bus has already been dropped. The topic's last
    /// value is retained for future replay subscribers.
    pub fn cancel(self) {
        if let Some(inner) = self.bus.upgrade() {
            let mut inner = inner.lock().expect("bus lock poisoned");
            if let Some(state) = inner.topics.get_mut(&self.topic) {
                state.observers.retain(|(id, _)| *id != self.id);
            }
        }
    }
}
