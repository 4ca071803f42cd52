//! In-memory bus and name resolvers for driving `GameModeClient` in tests.
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures::stream::{BoxStream, StreamExt};
use tokio::sync::oneshot;

use crate::bus::{BusConnector, DaemonProxy, GameSignal, Notification};
use crate::error::ClientError;
use crate::events::ClientEvent;
use crate::process_name::ProcessNameResolver;
use crate::GameModeClient;

/// Lets every ready task run until the runtime has nothing left to do.
pub async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

/// Collects every event `client` emits.
pub fn record(client: &GameModeClient) -> Arc<Mutex<Vec<ClientEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    client.subscribe(move |event| sink.lock().unwrap().push(event.clone()));
    events
}

pub struct FakeProxy {
    count: Mutex<Option<i32>>,
    tx: UnboundedSender<Notification>,
    rx: Mutex<Option<UnboundedReceiver<Notification>>>,
    method_status: Mutex<Result<i32, String>>,
    games: Mutex<Vec<(i32, String)>>,
    calls: Mutex<Vec<String>>,
}

impl FakeProxy {
    fn status(&self, call: String, method: &'static str) -> Result<i32, ClientError> {
        self.calls.lock().unwrap().push(call);
        self.method_status
            .lock()
            .unwrap()
            .clone()
            .map_err(|e| ClientError::method(method, zbus::Error::Failure(e)))
    }

    fn push(&self, notification: Notification) {
        // The client may have gone away; the daemon doesn't care.
        let _ = self.tx.unbounded_send(notification);
    }
}

#[async_trait]
impl DaemonProxy for FakeProxy {
    fn client_count(&self) -> Option<i32> {
        *self.count.lock().unwrap()
    }

    async fn notifications(&self) -> Result<BoxStream<'static, Notification>, ClientError> {
        self.rx
            .lock()
            .unwrap()
            .take()
            .map(|rx| rx.boxed())
            .ok_or_else(|| ClientError::subscription("GameMode signals", "not offered"))
    }

    async fn register_game(&self, pid: i32) -> Result<i32, ClientError> {
        self.status(format!("RegisterGame({pid})"), "RegisterGame")
    }

    async fn unregister_game(&self, pid: i32) -> Result<i32, ClientError> {
        self.status(format!("UnregisterGame({pid})"), "UnregisterGame")
    }

    async fn list_games(&self) -> Result<Vec<(i32, String)>, ClientError> {
        self.status("ListGames".to_string(), "ListGames")?;
        Ok(self.games.lock().unwrap().clone())
    }
}

/// A scripted daemon. `None` proxy means proxy resolution fails.
pub struct FakeBus {
    proxy: Option<Arc<FakeProxy>>,
}

struct FakeConnector {
    proxy: Option<Arc<FakeProxy>>,
}

#[async_trait]
impl BusConnector for FakeConnector {
    async fn connect(&self) -> Result<Arc<dyn DaemonProxy>, ClientError> {
        match &self.proxy {
            Some(proxy) => Ok(Arc::clone(proxy) as Arc<dyn DaemonProxy>),
            None => Err(ClientError::ProxyUnavailable("name has no owner".into())),
        }
    }
}

impl FakeBus {
    pub fn new(count: i32) -> Self {
        Self::build(count, true)
    }

    pub fn without_subscriptions(count: i32) -> Self {
        Self::build(count, false)
    }

    pub fn unavailable() -> Self {
        Self { proxy: None }
    }

    fn build(count: i32, offered: bool) -> Self {
        let (tx, rx) = unbounded();
        Self {
            proxy: Some(Arc::new(FakeProxy {
                count: Mutex::new(Some(count)),
                tx,
                rx: Mutex::new(offered.then_some(rx)),
                method_status: Mutex::new(Ok(0)),
                games: Mutex::new(Vec::new()),
                calls: Mutex::new(Vec::new()),
            })),
        }
    }

    pub fn connector(&self) -> Arc<dyn BusConnector> {
        Arc::new(FakeConnector {
            proxy: self.proxy.clone(),
        })
    }

    fn proxy(&self) -> &FakeProxy {
        self.proxy.as_deref().expect("fake bus has no proxy")
    }

    /// Updates the property and sends the matching PropertiesChanged.
    pub fn set_count(&self, count: i32) {
        self.set_count_silently(count);
        self.proxy().push(Notification::ClientCount(count));
    }

    pub fn set_count_silently(&self, count: i32) {
        *self.proxy().count.lock().unwrap() = Some(count);
    }

    pub fn register(&self, pid: i32, object_path: &str) {
        self.proxy().push(Notification::GameRegistered(GameSignal {
            pid,
            object_path: object_path.to_string(),
        }));
    }

    pub fn unregister(&self, pid: i32, object_path: &str) {
        self.proxy().push(Notification::GameUnregistered(GameSignal {
            pid,
            object_path: object_path.to_string(),
        }));
    }

    pub fn set_method_status(&self, status: Result<i32, String>) {
        *self.proxy().method_status.lock().unwrap() = status;
    }

    pub fn set_games(&self, games: Vec<(i32, String)>) {
        *self.proxy().games.lock().unwrap() = games;
    }

    pub fn calls(&self) -> Vec<String> {
        self.proxy().calls.lock().unwrap().clone()
    }

    /// True while a client still holds the notification stream.
    pub fn has_subscribers(&self) -> bool {
        !self.proxy().tx.is_closed()
    }
}

/// Answers every lookup immediately with the same outcome.
pub struct StaticResolver(Option<String>);

impl StaticResolver {
    pub fn named(name: &str) -> Arc<dyn ProcessNameResolver> {
        Arc::new(Self(Some(name.to_string())))
    }

    pub fn failing() -> Arc<dyn ProcessNameResolver> {
        Arc::new(Self(None))
    }
}

#[async_trait]
impl ProcessNameResolver for StaticResolver {
    async fn resolve(&self, pid: i32) -> Result<String, ClientError> {
        self.0.clone().ok_or(ClientError::NameResolutionFailed {
            pid,
            message: "lookup failed".into(),
        })
    }
}

/// Holds each lookup until the test releases it, oldest first per PID.
#[derive(Default)]
pub struct GatedResolver {
    pending: Mutex<HashMap<i32, VecDeque<oneshot::Sender<Option<String>>>>>,
}

impl GatedResolver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Completes the oldest outstanding lookup for `pid`; `None` fails it.
    pub fn release(&self, pid: i32, name: Option<&str>) {
        let sender = self
            .pending
            .lock()
            .unwrap()
            .get_mut(&pid)
            .and_then(VecDeque::pop_front)
            .expect("no pending lookup for pid");
        let _ = sender.send(name.map(str::to_string));
    }
}

#[async_trait]
impl ProcessNameResolver for GatedResolver {
    async fn resolve(&self, pid: i32) -> Result<String, ClientError> {
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .unwrap()
            .entry(pid)
            .or_default()
            .push_back(tx);
        rx.await
            .ok()
            .flatten()
            .ok_or(ClientError::NameResolutionFailed {
                pid,
                message: "lookup failed".into(),
            })
    }
}
