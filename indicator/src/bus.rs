//! Session-bus surface of the GameMode daemon.
//!
//! [`BusConnector`] and [`DaemonProxy`] are the only way the client touches
//! the bus, so tests can substitute an in-memory transport. The production
//! implementation is a `zbus` proxy for `com.feralinteractive.GameMode`.
//!
//! Nothing here may start the daemon: the connector refuses a name without an
//! owner and every method call carries `NO_AUTO_START`.
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use zbus::fdo::DBusProxy;
use zbus::message::Type as MessageType;
use zbus::names::{BusName, WellKnownName};
use zbus::zvariant::{OwnedObjectPath, OwnedValue};
use zbus::{CacheProperties, Connection, MatchRule, Message, MessageStream, MethodFlags};

use crate::error::ClientError;

pub const GAMEMODE_DBUS_NAME: &str = "com.feralinteractive.GameMode";
pub const GAMEMODE_DBUS_PATH: &str = "/com/feralinteractive/GameMode";
pub const GAMEMODE_DBUS_IFACE: &str = "com.feralinteractive.GameMode";
const PROPERTIES_IFACE: &str = "org.freedesktop.DBus.Properties";

/// Flags for every method call sent to the daemon.
const REMOTE_CALL_FLAGS: MethodFlags = MethodFlags::NoAutoStart;

/// Payload of the `GameRegistered` / `GameUnregistered` signals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameSignal {
    pub pid: i32,
    pub object_path: String,
}

/// One change reported by the daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    ClientCount(i32),
    GameRegistered(GameSignal),
    GameUnregistered(GameSignal),
}

/// Resolves a live proxy for the GameMode object.
#[async_trait]
pub trait BusConnector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn DaemonProxy>, ClientError>;
}

/// A live handle on the daemon's remote object.
#[async_trait]
pub trait DaemonProxy: Send + Sync {
    /// Current `ClientCount` as tracked by the proxy, without a round trip.
    /// `None` while the daemon has not reported a value.
    fn client_count(&self) -> Option<i32>;

    /// Every notification from the daemon on one stream, in the order the
    /// transport delivered them. Dropping the stream unsubscribes.
    async fn notifications(&self) -> Result<BoxStream<'static, Notification>, ClientError>;

    async fn register_game(&self, pid: i32) -> Result<i32, ClientError>;

    async fn unregister_game(&self, pid: i32) -> Result<i32, ClientError>;

    async fn list_games(&self) -> Result<Vec<(i32, String)>, ClientError>;
}

#[zbus::proxy(
    interface = "com.feralinteractive.GameMode",
    default_service = "com.feralinteractive.GameMode",
    default_path = "/com/feralinteractive/GameMode",
    gen_blocking = false
)]
trait GameMode {
    #[zbus(property)]
    fn client_count(&self) -> zbus::Result<i32>;
}

/// Connects to the session bus and builds a [`ZbusDaemonProxy`].
#[derive(Debug, Default, Clone, Copy)]
pub struct ZbusConnector;

fn ensure_owned(has_owner: bool) -> Result<(), ClientError> {
    if has_owner {
        Ok(())
    } else {
        Err(ClientError::ProxyUnavailable(format!("{GAMEMODE_DBUS_NAME} has no owner")))
    }
}

#[async_trait]
impl BusConnector for ZbusConnector {
    async fn connect(&self) -> Result<Arc<dyn DaemonProxy>, ClientError> {
        let connection = Connection::session()
            .await
            .map_err(|e| ClientError::ProxyUnavailable(format!("session bus: {e}")))?;

        // Building the proxy fetches properties, which would activate an
        // unowned name.
        let dbus = DBusProxy::new(&connection)
            .await
            .map_err(|e| ClientError::ProxyUnavailable(format!("session bus: {e}")))?;
        let name = BusName::from(WellKnownName::from_static_str_unchecked(GAMEMODE_DBUS_NAME));
        let has_owner = dbus
            .name_has_owner(name)
            .await
            .map_err(|e| ClientError::ProxyUnavailable(format!("{GAMEMODE_DBUS_NAME}: {e}")))?;
        ensure_owned(has_owner)?;

        let proxy = GameModeProxy::builder(&connection)
            .cache_properties(CacheProperties::Yes)
            .build()
            .await
            .map_err(|e| ClientError::ProxyUnavailable(format!("{GAMEMODE_DBUS_NAME}: {e}")))?;

        tracing::debug!(
            name = GAMEMODE_DBUS_NAME,
            path = GAMEMODE_DBUS_PATH,
            "GameMode proxy resolved"
        );
        Ok(Arc::new(ZbusDaemonProxy { connection, proxy }))
    }
}

pub struct ZbusDaemonProxy {
    connection: Connection,
    proxy: GameModeProxy<'static>,
}

impl ZbusDaemonProxy {
    async fn call<B, R>(&self, method: &'static str, body: &B) -> Result<R, ClientError>
    where
        B: serde::Serialize + zbus::zvariant::DynamicType + Sync,
        R: for<'d> zbus::zvariant::DynamicDeserialize<'d> + Send,
    {
        self.proxy
            .inner()
            .call_with_flags(method, REMOTE_CALL_FLAGS.into(), body)
            .await
            .map_err(|e| ClientError::method(method, e))?
            .ok_or_else(|| ClientError::method(method, zbus::Error::InvalidReply))
    }
}

#[async_trait]
impl DaemonProxy for ZbusDaemonProxy {
    fn client_count(&self) -> Option<i32> {
        self.proxy.cached_client_count().ok().flatten()
    }

    async fn notifications(&self) -> Result<BoxStream<'static, Notification>, ClientError> {
        let rule = MatchRule::builder()
            .msg_type(MessageType::Signal)
            .sender(GAMEMODE_DBUS_NAME)
            .and_then(|rule| rule.path(GAMEMODE_DBUS_PATH))
            .map_err(|e| ClientError::subscription("GameMode signals", e))?
            .build();
        let stream = MessageStream::for_match_rule(rule, &self.connection, None)
            .await
            .map_err(|e| ClientError::subscription("GameMode signals", e))?;

        Ok(stream
            .filter_map(|message| async move {
                match message {
                    Ok(message) => decode(&message),
                    Err(e) => {
                        tracing::debug!(error = %e, "Ignoring unreadable GameMode message");
                        None
                    }
                }
            })
            .boxed())
    }

    async fn register_game(&self, pid: i32) -> Result<i32, ClientError> {
        self.call("RegisterGame", &(pid,)).await
    }

    async fn unregister_game(&self, pid: i32) -> Result<i32, ClientError> {
        self.call("UnregisterGame", &(pid,)).await
    }

    async fn list_games(&self) -> Result<Vec<(i32, String)>, ClientError> {
        let games: Vec<(i32, OwnedObjectPath)> = self.call("ListGames", &()).await?;
        Ok(games
            .into_iter()
            .map(|(pid, path)| (pid, path.to_string()))
            .collect())
    }
}

/// Turns a signal from the GameMode object into a [`Notification`]. Signals
/// the client does not track, and ones that fail to decode, yield `None`.
fn decode(message: &Message) -> Option<Notification> {
    let header = message.header();
    let interface = header.interface()?;
    let member = header.member()?;
    match (interface.as_str(), member.as_str()) {
        (GAMEMODE_DBUS_IFACE, "GameRegistered") => {
            game_signal(message, "GameRegistered").map(Notification::GameRegistered)
        }
        (GAMEMODE_DBUS_IFACE, "GameUnregistered") => {
            game_signal(message, "GameUnregistered").map(Notification::GameUnregistered)
        }
        (PROPERTIES_IFACE, "PropertiesChanged") => {
            client_count_change(message).map(Notification::ClientCount)
        }
        _ => None,
    }
}

fn game_signal(message: &Message, member: &'static str) -> Option<GameSignal> {
    match message.body().deserialize::<(i32, OwnedObjectPath)>() {
        Ok((pid, object_path)) => Some(GameSignal {
            pid,
            object_path: object_path.to_string(),
        }),
        Err(e) => {
            tracing::debug!(member, error = %e, "Ignoring undecodable GameMode signal");
            None
        }
    }
}

fn client_count_change(message: &Message) -> Option<i32> {
    let (interface, changed, invalidated) = match message
        .body()
        .deserialize::<(String, HashMap<String, OwnedValue>, Vec<String>)>()
    {
        Ok(body) => body,
        Err(e) => {
            tracing::debug!(error = %e, "Ignoring undecodable PropertiesChanged");
            return None;
        }
    };
    if interface != GAMEMODE_DBUS_IFACE {
        return None;
    }
    match changed.get("ClientCount") {
        Some(value) => match i32::try_from(value) {
            Ok(count) => Some(count),
            Err(e) => {
                tracing::debug!(error = %e, "Ignoring unreadable ClientCount change");
                None
            }
        },
        None => {
            if invalidated.iter().any(|name| name == "ClientCount") {
                tracing::debug!("ClientCount invalidated without a value");
            }
            None
        }
    }
}
