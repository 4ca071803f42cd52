mod config;
mod event;
mod paths;
mod status;
mod telemetry;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use gamemode_indicator::{
    ClientEvent, ConnectionState, GameModeClient, SysinfoResolver, ZbusConnector,
};
use tokio::sync::mpsc;

use crate::event::IndicatorEvent;

const REFRESH_INTERVAL_SECS: u64 = 2;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let _telemetry = telemetry::init_tracing("info");

    // ── Configuration ─────────────────────────────────────────────────────────
    let config_path = paths::config_file_path();
    let mut config = config::load_or_default(&config_path).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Invalid config, using defaults");
        config::Config::default()
    });

    // ── Initial status ────────────────────────────────────────────────────────
    let status_path = paths::status_file_path();
    status::write_status(&status_path, &status::IndicatorStatus::new(&config));

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<IndicatorEvent>();

    // ── GameMode client ───────────────────────────────────────────────────────
    let client = GameModeClient::new(
        Arc::new(ZbusConnector),
        Arc::new(SysinfoResolver),
        Some(Box::new(|client: GameModeClient| {
            tracing::info!(client_count = client.client_count(), "GameMode client ready");
        })),
    );
    {
        let tx = event_tx.clone();
        client.subscribe(move |evt| {
            let _ = tx.send(IndicatorEvent::Client(evt.clone()));
        });
    }
    {
        let tx = event_tx.clone();
        let mut connection = client.watch_connection();
        tokio::spawn(async move {
            while connection.changed().await.is_ok() {
                let state = *connection.borrow_and_update();
                if tx.send(IndicatorEvent::Connection(state)).is_err() {
                    break;
                }
            }
        });
    }

    // ── Background tasks ──────────────────────────────────────────────────────
    tokio::spawn(config::watch_config(config_path, event_tx.clone()));
    {
        let tx = event_tx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = tx.send(IndicatorEvent::Shutdown);
            }
        });
    }
    drop(event_tx);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "gamemode-indicator started");

    // ── Event loop ────────────────────────────────────────────────────────────
    let mut last_changed: Option<String> = None;
    // Name lookups land after their GameRegistered event, and the count is read
    // live from the proxy, so the status is also refreshed periodically.
    let mut ticker = tokio::time::interval(Duration::from_secs(REFRESH_INTERVAL_SECS));

    loop {
        let evt = tokio::select! {
            evt = event_rx.recv() => match evt {
                Some(evt) => evt,
                None => break,
            },
            _ = ticker.tick() => {
                write_snapshot(&status_path, &client, &config, &last_changed);
                continue;
            }
        };

        match evt {
            IndicatorEvent::Client(ClientEvent::StateChanged { active }) => {
                last_changed = Some(chrono::Local::now().to_rfc3339());
                if active && config.show_launch_notification {
                    tracing::info!("GameMode is Enabled!");
                } else if !active && config.show_close_notification {
                    tracing::info!("GameMode is Disabled!");
                }
            }

            IndicatorEvent::Client(ClientEvent::CountChanged(count)) => {
                tracing::debug!(client_count = count, "Client count changed");
            }

            IndicatorEvent::Client(ClientEvent::GameRegistered { pid, object_path }) => {
                tracing::info!(pid, %object_path, "Game registered");
            }

            IndicatorEvent::Client(ClientEvent::GameUnregistered { pid, object_path }) => {
                tracing::info!(pid, %object_path, "Game unregistered");
            }

            IndicatorEvent::Connection(ConnectionState::Unavailable) => {
                tracing::warn!("GameMode is not available; install gamemode and restart the indicator");
            }

            IndicatorEvent::Connection(state) => {
                tracing::debug!(?state, "Connection state changed");
            }

            IndicatorEvent::ConfigReloaded(new_config) => {
                tracing::info!("Config reloaded");
                config = new_config;
            }

            IndicatorEvent::Shutdown => {
                tracing::info!("Shutting down");
                client.close();
                let mut final_status =
                    status::IndicatorStatus::from_client(&client, &config, last_changed);
                final_status.label = "GameMode indicator stopped".to_string();
                status::write_status(&status_path, &final_status);
                break;
            }
        }

        write_snapshot(&status_path, &client, &config, &last_changed);
    }
}

fn write_snapshot(
    path: &Path,
    client: &GameModeClient,
    config: &config::Config,
    last_changed: &Option<String>,
) {
    let snapshot = status::IndicatorStatus::from_client(client, config, last_changed.clone());
    status::write_status(path, &snapshot);
}
