//! Publish/subscribe fan-out for channel events.

use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

/// Identifies one consumer's subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Callback invoked for each event.
pub type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Registered listeners in subscription order.
///
/// Notification works on a [`snapshot`](Self::snapshot), so a listener may
/// remove itself (or others) while being notified.
pub struct ListenerSet<E> {
    entries: Vec<(SubscriptionId, Listener<E>)>,
}

impl<E> Default for ListenerSet<E> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<E> ListenerSet<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener, replacing any previous one for `id`.
    pub fn insert(&mut self, id: SubscriptionId, listener: Listener<E>) {
        match self.entries.iter_mut().find(|(existing, _)| *existing == id) {
            Some(slot) => slot.1 = listener,
            None => self.entries.push((id, listener)),
        }
    }

    /// Removes the listener for `id`. Returns `true` if one was registered.
    pub fn remove(&mut self, id: SubscriptionId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(existing, _)| *existing != id);
        self.entries.len() != before
    }

    pub fn contains(&self, id: SubscriptionId) -> bool {
        self.entries.iter().any(|(existing, _)| *existing == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Clones the current listeners so they can be called without holding
    /// the registry lock.
    pub fn snapshot(&self) -> Vec<Listener<E>> {
        self.entries.iter().map(|(_, l)| l.clone()).collect()
    }

    /// Notifies every listener registered right now.
    pub fn notify(&self, event: &E) {
        notify(&self.snapshot(), event);
    }
}

/// Calls each listener in order.
pub fn notify<E>(listeners: &[Listener<E>], event: &E) {
    for listener in listeners {
        listener(event);
    }
}
