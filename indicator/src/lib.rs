//! Client-side view of the Feral GameMode daemon.
//!
//! [`GameModeClient`] keeps a local, observable copy of the daemon's state
//! (`ClientCount` and the games registered with it) in sync with the
//! daemon's session-bus notifications. The bus and the process table are
//! reached only through [`BusConnector`] and [`ProcessNameResolver`], so both
//! can be replaced in tests.
//!
//! ```ignore
//! let client = GameModeClient::new(Arc::new(ZbusConnector), Arc::new(SysinfoResolver), None);
//! client.subscribe(|event| println!("{event:?}"));
//! ```

pub mod bus;
pub mod client;
pub mod error;
pub mod events;
pub mod process_name;

#[cfg(test)]
mod testing;

pub use bus::{BusConnector, DaemonProxy, GameSignal, Notification, ZbusConnector};
pub use client::{ConnectionState, GameModeClient, ProcessRecord, ReadyCallback};
pub use error::{ClientError, TRANSPORT_ERROR_STATUS};
pub use events::{ClientEvent, SubscriptionId};
pub use process_name::{ProcessNameResolver, SysinfoResolver};
