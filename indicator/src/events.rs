//! Domain events re-published by [`GameModeClient`](crate::GameModeClient) and
//! the listener registry that delivers them.
//!
//! Listeners are plain callbacks invoked synchronously, in registration order,
//! on whichever task performed the reconciliation. A listener may read the
//! client's accessors or unsubscribe itself from inside the callback.
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// `ClientCount` crossed zero. `active` mirrors `GameModeClient::is_active`
    /// at the moment of the transition.
    StateChanged { active: bool },
    /// `ClientCount` took a new value.
    CountChanged(i32),
    /// The daemon accepted a game. The process record may still be unnamed.
    GameRegistered { pid: i32, object_path: String },
    /// The daemon released a game.
    GameUnregistered { pid: i32, object_path: String },
}

/// Token returned by `subscribe`; pass it back to `unsubscribe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

pub type Listener = Arc<dyn Fn(&ClientEvent) + Send + Sync>;

#[derive(Default)]
pub(crate) struct Listeners {
    next_id: u64,
    entries: Vec<(SubscriptionId, Listener)>,
}

impl Listeners {
    pub(crate) fn add(&mut self, listener: Listener) -> SubscriptionId {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.entries.push((id, listener));
        id
    }

    /// Returns `false` if `id` was never issued or is already gone.
    pub(crate) fn remove(&mut self, id: SubscriptionId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry, _)| *entry != id);
        self.entries.len() != before
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    /// Copies the current listeners so they can be called without holding the
    /// registry lock.
    pub(crate) fn snapshot(&self) -> Vec<Listener> {
        self.entries.iter().map(|(_, l)| Arc::clone(l)).collect()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Events produced by one `ClientCount` reconciliation step.
///
/// The boolean transition and the numeric change are judged independently:
/// 1 -> 2 yields only `CountChanged`, 0 -> 2 yields both, 2 -> 2 yields nothing.
pub(crate) fn count_transition(previous: i32, current: i32) -> Vec<ClientEvent> {
    let mut events = Vec::with_capacity(2);
    let was_active = previous > 0;
    let is_active = current > 0;
    if was_active != is_active {
        events.push(ClientEvent::StateChanged { active: is_active });
    }
    if previous != current {
        events.push(ClientEvent::CountChanged(current));
    }
    events
}
