//! Scoped listener registry
//!
//! Listeners are registered with [`ListenerRegistry::subscribe`], which hands
//! back a [`Subscription`]. Dropping the subscription removes the listener.
//! Listeners are notified in registration order, outside the registry lock,
//! so a listener may subscribe or unsubscribe from inside a callback.

use parking_lot::RwLock;
use std::sync::{Arc, Weak};
use uuid::Uuid;

/// Identifies one registered listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Sub({})", &self.0.to_string()[..8])
    }
}

type Entries<L> = RwLock<Vec<(SubscriptionId, Arc<L>)>>;

/// Owned collection of listeners of type `L`
///
/// Cloning the registry shares the underlying list.
pub struct ListenerRegistry<L: ?Sized> {
    entries: Arc<Entries<L>>,
}

impl<L: ?Sized + Send + Sync + 'static> ListenerRegistry<L> {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Register a listener; it stays registered while the token lives
    #[must_use = "dropping the subscription unregisters the listener"]
    pub fn subscribe(&self, listener: Arc<L>) -> Subscription {
        let id = SubscriptionId::new();
        self.entries.write().push((id, listener));
        tracing::debug!("Listener {} subscribed", id);

        let weak: Weak<Entries<L>> = Arc::downgrade(&self.entries);
        Subscription {
            id,
            remover: Some(Box::new(move |id| {
                if let Some(entries) = weak.upgrade() {
                    remove_entry(&entries, id);
                }
            })),
        }
    }

    /// Remove a listener by id. Returns true if it was registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        remove_entry(&self.entries, id)
    }

    /// Number of registered listeners
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether no listener is registered
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Invoke `f` on every listener in registration order
    pub fn notify(&self, mut f: impl FnMut(&L)) {
        let snapshot: Vec<Arc<L>> = self
            .entries
            .read()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in &snapshot {
            f(listener);
        }
    }
}

fn remove_entry<L: ?Sized>(entries: &Entries<L>, id: SubscriptionId) -> bool {
    let mut entries = entries.write();
    let before = entries.len();
    entries.retain(|(entry_id, _)| *entry_id != id);
    let removed = entries.len() != before;
    if removed {
        tracing::debug!("Listener {} unsubscribed", id);
    }
    removed
}

impl<L: ?Sized + Send + Sync + 'static> Default for ListenerRegistry<L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: ?Sized> Clone for ListenerRegistry<L> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
        }
    }
}

impl<L: ?Sized> std::fmt::Debug for ListenerRegistry<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners", &self.entries.read().len())
            .finish()
    }
}

/// Token returned by [`ListenerRegistry::subscribe`]
///
/// Dropping it unregisters the listener. Use [`Subscription::detach`] to keep
/// the listener registered for the registry's whole lifetime.
pub struct Subscription {
    id: SubscriptionId,
    remover: Option<Box<dyn FnOnce(SubscriptionId) + Send + Sync>>,
}

impl Subscription {
    /// Id of the registered listener
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Keep the listener registered and give up the token
    pub fn detach(mut self) -> SubscriptionId {
        self.remover = None;
        self.id
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(remove) = self.remover.take() {
            remove(self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("attached", &self.remover.is_some())
            .finish()
    }
}
