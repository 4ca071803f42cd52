use gamemode_indicator::{ClientEvent, ConnectionState};

use crate::config::Config;

pub enum IndicatorEvent {
    /// Forwarded from the GameMode client's listener.
    Client(ClientEvent),
    /// The client's connection moved, e.g. to `Unavailable`.
    Connection(ConnectionState),
    /// The config file changed on disk and was successfully re-parsed.
    ConfigReloaded(Config),
    /// Ctrl+C received; close the client and exit.
    Shutdown,
}
