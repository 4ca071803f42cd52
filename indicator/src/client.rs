//! Local view of the GameMode daemon's state.
//!
//! A [`GameModeClient`] attaches to the daemon in the background, reconciles
//! `ClientCount` changes and game (un)registration signals into a small local
//! model, and re-publishes them as [`ClientEvent`]s. Construction never blocks
//! and never fails: if the proxy cannot be resolved the client stays inert
//! (`ConnectionState::Unavailable`, zero clients) until it is discarded.
//!
//! Listeners registered before the constructing task next yields observe the
//! seeding events of the initial reconciliation. On the current-thread runtime
//! this means "registered right after `new`".
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use futures::stream::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::bus::{BusConnector, DaemonProxy, GameSignal, Notification};
use crate::error::ClientError;
use crate::events::{count_transition, ClientEvent, Listener, Listeners, SubscriptionId};
use crate::process_name::ProcessNameResolver;

/// Invoked once, after the proxy is live and the initial reconciliation ran.
pub type ReadyCallback = Box<dyn FnOnce(GameModeClient) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Proxy resolution is still in flight.
    Connecting,
    Connected,
    /// Proxy resolution failed. Terminal; create a new client to retry.
    Unavailable,
    Closed,
}

/// What the client knows about one registered game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRecord {
    /// `None` until the name lookup completes, and for good if it fails.
    pub display_name: Option<String>,
    pub object_path: String,
}

struct Tracked {
    record: ProcessRecord,
    /// Registration sequence number; a name lookup only lands on the
    /// registration that started it.
    seq: u64,
}

struct State {
    proxy: Option<Arc<dyn DaemonProxy>>,
    last_count: i32,
    processes: HashMap<i32, Tracked>,
    next_seq: u64,
}

struct Shared {
    state: Mutex<State>,
    listeners: Mutex<Listeners>,
    connection: watch::Sender<ConnectionState>,
    resolver: Arc<dyn ProcessNameResolver>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

/// Handle on the synchronized daemon state. Clones share the same client.
#[derive(Clone)]
pub struct GameModeClient {
    shared: Arc<Shared>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl GameModeClient {
    /// Starts attaching to the daemon through `connector`. Must be called from
    /// within a tokio runtime.
    pub fn new(
        connector: Arc<dyn BusConnector>,
        resolver: Arc<dyn ProcessNameResolver>,
        on_ready: Option<ReadyCallback>,
    ) -> Self {
        let (connection, _) = watch::channel(ConnectionState::Connecting);
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                proxy: None,
                last_count: 0,
                processes: HashMap::new(),
                next_seq: 0,
            }),
            listeners: Mutex::new(Listeners::default()),
            connection,
            resolver,
            driver: Mutex::new(None),
        });

        let handle = tokio::spawn(drive(Arc::downgrade(&shared), connector, on_ready));
        *lock(&shared.driver) = Some(handle);

        Self { shared }
    }

    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&ClientEvent) + Send + Sync + 'static,
    {
        let listener: Listener = Arc::new(listener);
        lock(&self.shared.listeners).add(listener)
    }

    /// Returns `false` if the subscription was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        lock(&self.shared.listeners).remove(id)
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.shared.connection.borrow()
    }

    /// Follows connection state changes, e.g. to notice `Unavailable`, which
    /// no [`ClientEvent`] reports.
    pub fn watch_connection(&self) -> watch::Receiver<ConnectionState> {
        self.shared.connection.subscribe()
    }

    /// Live `ClientCount` read from the proxy; 0 when no proxy is attached.
    pub fn client_count(&self) -> i32 {
        self.shared
            .proxy()
            .and_then(|proxy| proxy.client_count())
            .unwrap_or(0)
            .max(0)
    }

    pub fn is_active(&self) -> bool {
        self.client_count() > 0
    }

    /// Copy of the registration cache. May lag behind `client_count`.
    pub fn registered_processes(&self) -> HashMap<i32, ProcessRecord> {
        lock(&self.shared.state)
            .processes
            .iter()
            .map(|(pid, tracked)| (*pid, tracked.record.clone()))
            .collect()
    }

    pub fn process(&self, pid: i32) -> Option<ProcessRecord> {
        lock(&self.shared.state)
            .processes
            .get(&pid)
            .map(|tracked| tracked.record.clone())
    }

    /// Asks the daemon to register `pid`. `Ok` carries the daemon's status
    /// (`0` accepted, `-1` rejected); see [`ClientError::status_code`] for the
    /// status equivalent of an `Err`.
    pub async fn register_game(&self, pid: i32) -> Result<i32, ClientError> {
        let proxy = self.shared.proxy().ok_or(ClientError::NotConnected)?;
        proxy.register_game(pid).await
    }

    pub async fn unregister_game(&self, pid: i32) -> Result<i32, ClientError> {
        let proxy = self.shared.proxy().ok_or(ClientError::NotConnected)?;
        proxy.unregister_game(pid).await
    }

    /// `(pid, object path)` pairs for every game the daemon currently tracks.
    pub async fn list_games(&self) -> Result<Vec<(i32, String)>, ClientError> {
        let proxy = self.shared.proxy().ok_or(ClientError::NotConnected)?;
        proxy.list_games().await
    }

    /// Releases the subscriptions and the proxy. Idempotent. Nothing is
    /// emitted afterwards, including by lookups still in flight.
    pub fn close(&self) {
        self.shared.close();
    }
}

impl Shared {
    fn proxy(&self) -> Option<Arc<dyn DaemonProxy>> {
        if *self.connection.borrow() != ConnectionState::Connected {
            return None;
        }
        lock(&self.state).proxy.clone()
    }

    fn is_closed(&self) -> bool {
        *self.connection.borrow() == ConnectionState::Closed
    }

    /// Moves `from` to `to`; a no-op if the state has moved on in the meantime
    /// (e.g. `close` won the race against attach).
    fn transition(&self, from: ConnectionState, to: ConnectionState) -> bool {
        self.connection.send_if_modified(|current| {
            if *current == from {
                *current = to;
                true
            } else {
                false
            }
        })
    }

    fn close(&self) {
        let proxy = {
            let mut state = lock(&self.state);
            let changed = self.connection.send_if_modified(|current| {
                if *current == ConnectionState::Closed {
                    false
                } else {
                    *current = ConnectionState::Closed;
                    true
                }
            });
            if !changed {
                return;
            }
            state.processes.clear();
            state.last_count = 0;
            state.proxy.take()
        };

        lock(&self.listeners).clear();
        if let Some(handle) = lock(&self.driver).take() {
            handle.abort();
        }
        drop(proxy);
        tracing::info!("GameMode client closed");
    }

    /// Installs the live proxy and returns the seeding events: an
    /// already-active daemon is reported as one activation.
    fn attach(&self, proxy: Arc<dyn DaemonProxy>) -> Option<Vec<ClientEvent>> {
        let count = proxy.client_count().unwrap_or(0).max(0);
        {
            let mut state = lock(&self.state);
            if !self.transition(ConnectionState::Connecting, ConnectionState::Connected) {
                return None;
            }
            state.proxy = Some(proxy);
            state.last_count = count;
        }
        tracing::info!(client_count = count, "Attached to GameMode");
        Some(count_transition(0, count))
    }

    fn emit(&self, events: Vec<ClientEvent>) {
        for event in events {
            if self.is_closed() {
                return;
            }
            let listeners = lock(&self.listeners).snapshot();
            for listener in listeners {
                listener(&event);
            }
        }
    }

    fn on_count(&self, count: i32) {
        let count = count.max(0);
        let events = {
            let mut state = lock(&self.state);
            let previous = std::mem::replace(&mut state.last_count, count);
            count_transition(previous, count)
        };
        tracing::debug!(client_count = count, events = events.len(), "ClientCount reconciled");
        self.emit(events);
    }

    fn on_registered(self: &Arc<Self>, signal: GameSignal) {
        let GameSignal { pid, object_path } = signal;
        let seq = {
            let mut state = lock(&self.state);
            state.next_seq += 1;
            let seq = state.next_seq;
            state.processes.insert(
                pid,
                Tracked {
                    record: ProcessRecord {
                        display_name: None,
                        object_path: object_path.clone(),
                    },
                    seq,
                },
            );
            seq
        };
        tracing::debug!(pid, %object_path, "Game registered");
        self.emit(vec![ClientEvent::GameRegistered { pid, object_path }]);

        let resolver = Arc::clone(&self.resolver);
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            let name = match resolver.resolve(pid).await {
                Ok(name) => Some(name),
                Err(e) => {
                    tracing::debug!(pid, error = %e, "Process name unavailable");
                    None
                }
            };
            if let Some(shared) = weak.upgrade() {
                shared.apply_name(pid, seq, name);
            }
        });
    }

    fn apply_name(&self, pid: i32, seq: u64, name: Option<String>) {
        if self.is_closed() {
            return;
        }
        let mut state = lock(&self.state);
        if let Some(tracked) = state.processes.get_mut(&pid) {
            if tracked.seq == seq {
                tracked.record.display_name = name;
            }
        }
    }

    fn on_unregistered(&self, signal: GameSignal) {
        let GameSignal { pid, object_path } = signal;
        let removed = lock(&self.state).processes.remove(&pid).is_some();
        tracing::debug!(pid, %object_path, removed, "Game unregistered");
        self.emit(vec![ClientEvent::GameUnregistered { pid, object_path }]);
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        if let Some(handle) = lock(&self.driver).take() {
            handle.abort();
        }
    }
}

async fn drive(
    weak: Weak<Shared>,
    connector: Arc<dyn BusConnector>,
    on_ready: Option<ReadyCallback>,
) {
    let proxy = match connector.connect().await {
        Ok(proxy) => proxy,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to initialize GameMode client");
            if let Some(shared) = weak.upgrade() {
                shared.transition(ConnectionState::Connecting, ConnectionState::Unavailable);
            }
            return;
        }
    };

    // One stream for every notification kind keeps them in delivery order.
    let notifications = match proxy.notifications().await {
        Ok(stream) => Some(stream),
        Err(e) => {
            tracing::warn!(error = %e, "GameMode notifications unavailable");
            None
        }
    };

    {
        let Some(shared) = weak.upgrade() else { return };
        let Some(seed) = shared.attach(proxy) else { return };
        shared.emit(seed);
        if let Some(on_ready) = on_ready {
            on_ready(GameModeClient { shared });
        }
    }

    let Some(mut notifications) = notifications else { return };
    while let Some(notification) = notifications.next().await {
        let Some(shared) = weak.upgrade() else { break };
        if shared.is_closed() {
            break;
        }
        match notification {
            Notification::ClientCount(count) => shared.on_count(count),
            Notification::GameRegistered(signal) => shared.on_registered(signal),
            Notification::GameUnregistered(signal) => shared.on_unregistered(signal),
        }
    }
}
