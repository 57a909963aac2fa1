use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;

use roomwire_core::protocol::{Envelope, EventKind, TypedPayload};

/// Event callback. Invoked synchronously on the dispatching task.
pub type Listener = Arc<dyn Fn(&Envelope) + Send + Sync>;

/// Which envelopes a listener receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventFilter {
    /// Only envelopes of this type.
    Kind(EventKind),
    /// Every envelope regardless of type.
    All,
}

impl From<EventKind> for EventFilter {
    fn from(kind: EventKind) -> Self {
        EventFilter::Kind(kind)
    }
}

/// Handle returned by every `subscribe`. Consuming it removes exactly the
/// listener it was created for.
#[must_use = "dropping a Subscription keeps the listener registered; call unsubscribe() to remove it"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Subscription that removes nothing.
    pub fn noop() -> Self {
        Self { cancel: None }
    }

    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// Listener registry keyed by event filter.
///
/// Delivery order: listeners for the envelope's kind in registration order,
/// then wildcard listeners in registration order.
#[derive(Default)]
pub struct ListenerRegistry {
    channels: DashMap<EventFilter, Vec<(u64, Listener)>>,
    next_id: AtomicU64,
}

impl ListenerRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            channels: DashMap::new(),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn subscribe<F>(self: &Arc<Self>, filter: EventFilter, listener: F) -> Subscription
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        self.subscribe_arc(filter, Arc::new(listener))
    }

    pub fn subscribe_arc(self: &Arc<Self>, filter: EventFilter, listener: Listener) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.channels.entry(filter).or_default().push((id, listener));

        let weak: Weak<Self> = Arc::downgrade(self);
        Subscription::new(move || {
            if let Some(registry) = weak.upgrade() {
                registry.remove(filter, id);
            }
        })
    }

    /// Subscribe to one payload type; the listener gets the decoded payload.
    pub fn subscribe_typed<P, F>(self: &Arc<Self>, listener: F) -> Subscription
    where
        P: TypedPayload,
        F: Fn(&P, &Envelope) + Send + Sync + 'static,
    {
        self.subscribe(EventFilter::Kind(P::KIND), move |env| {
            if let Some(payload) = P::from_event(&env.event) {
                listener(payload, env);
            }
        })
    }

    /// Fan one envelope out. Returns the number of listeners invoked.
    pub fn dispatch(&self, env: &Envelope) -> usize {
        // Snapshot first so listeners may (un)subscribe from inside a callback.
        let mut targets = self.snapshot(EventFilter::Kind(env.kind()));
        targets.extend(self.snapshot(EventFilter::All));

        for listener in &targets {
            listener(env);
        }
        tracing::debug!(kind = env.kind().as_str(), listeners = targets.len(), "dispatched");
        targets.len()
    }

    /// Drop every registration.
    pub fn clear(&self) {
        self.channels.clear();
    }

    pub fn len(&self) -> usize {
        self.channels.iter().map(|e| e.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self, filter: EventFilter) -> Vec<Listener> {
        self.channels
            .get(&filter)
            .map(|v| v.iter().map(|(_, l)| Arc::clone(l)).collect())
            .unwrap_or_default()
    }

    fn remove(&self, filter: EventFilter, id: u64) {
        if let Some(mut list) = self.channels.get_mut(&filter) {
            list.retain(|(lid, _)| *lid != id);
        }
    }
}
