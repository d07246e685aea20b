//! State-changed notification.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::state::StateId;

/// A completed change of state. `from` is `None` for the first transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateChange<S> {
    pub from: Option<S>,
    pub to: S,
}

/// Identifies a subscription so it can be removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener<S> = Arc<dyn Fn(&StateChange<S>) + Send + Sync>;

/// Subscribers to [`StateChange`]s.
///
/// Listeners run inline on whichever context completed the transition,
/// in subscription order, with no lock held.
pub struct ChangeListeners<S> {
    listeners: Mutex<Vec<(ListenerId, Listener<S>)>>,
    next_id: AtomicU64,
}

impl<S> Default for ChangeListeners<S> {
    fn default() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
        }
    }
}

impl<S: StateId> ChangeListeners<S> {
    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&StateChange<S>) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().push((id, Arc::new(listener)));
        id
    }

    /// Removes a listener. Returns `false` if it was not subscribed.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.lock();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    pub fn emit(&self, change: StateChange<S>) {
        let snapshot: Vec<Listener<S>> = self
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in snapshot {
            listener(&change);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(ListenerId, Listener<S>)>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<S> fmt::Debug for ChangeListeners<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        f.debug_struct("ChangeListeners")
            .field("listeners", &count)
            .finish()
    }
}
