use anyhow::{Context, Result};
use notify::{Config as NotifyConfig, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

use crate::event::IndicatorEvent;

pub const DEFAULT_ACTIVE_COLOR: &str = "rgb(46,194,126)";
pub const DEFAULT_INACTIVE_COLOR: &str = "rgb(255,255,255)";

/// Indicator preferences. Deserialized from
/// `$XDG_CONFIG_HOME/gamemode-indicator/config.toml`; every key is optional.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Announce when GameMode turns on.
    pub show_launch_notification: bool,
    /// Announce when GameMode turns off.
    pub show_close_notification: bool,
    /// Hide the icon while no game holds GameMode.
    pub show_icon_only_when_active: bool,
    /// Read by the desktop integration; the indicator only carries it along.
    pub enable_do_not_disturb: bool,
    /// Icon tint while active, `rgb(r,g,b)`.
    pub active_color: String,
    /// Icon tint while inactive, `rgb(r,g,b)`.
    pub inactive_color: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            show_launch_notification: true,
            show_close_notification: true,
            show_icon_only_when_active: false,
            enable_do_not_disturb: false,
            active_color: DEFAULT_ACTIVE_COLOR.to_string(),
            inactive_color: DEFAULT_INACTIVE_COLOR.to_string(),
        }
    }
}

/// An icon tint with channels normalized to `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgb {
    pub red: f64,
    pub green: f64,
    pub blue: f64,
}

impl Rgb {
    pub const WHITE: Rgb = Rgb {
        red: 1.0,
        green: 1.0,
        blue: 1.0,
    };

    /// Parses `rgb(r,g,b)` with 0-255 channels. Anything else is white.
    pub fn parse(value: &str) -> Rgb {
        Self::try_parse(value).unwrap_or(Self::WHITE)
    }

    fn try_parse(value: &str) -> Option<Rgb> {
        let inner = value
            .trim()
            .strip_prefix("rgb(")?
            .strip_suffix(')')?;
        let mut channels = inner.split(',').map(|c| c.trim().parse::<u8>().ok());
        let red = channels.next()??;
        let green = channels.next()??;
        let blue = channels.next()??;
        if channels.next().is_some() {
            return None;
        }
        Some(Rgb {
            red: f64::from(red) / 255.0,
            green: f64::from(green) / 255.0,
            blue: f64::from(blue) / 255.0,
        })
    }

    /// Formats back to `rgb(r,g,b)`, flooring each scaled channel.
    pub fn to_css(self) -> String {
        let scale = |c: f64| (c.clamp(0.0, 1.0) * 255.0).floor() as u8;
        format!(
            "rgb({},{},{})",
            scale(self.red),
            scale(self.green),
            scale(self.blue)
        )
    }
}

impl Config {
    pub fn active_rgb(&self) -> Rgb {
        Rgb::parse(&self.active_color)
    }

    pub fn inactive_rgb(&self) -> Rgb {
        Rgb::parse(&self.inactive_color)
    }
}

/// Loads the config file at `path`, returning `Config::default()` if the file does not exist.
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_or_default(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Watches the parent directory of `path`. Whenever the config file is created
/// or modified, reloads it and sends a `ConfigReloaded` event.
pub async fn watch_config(path: PathBuf, tx: mpsc::UnboundedSender<IndicatorEvent>) {
    let (watch_tx, mut watch_rx) = mpsc::channel::<notify::Event>(16);

    let mut watcher = match RecommendedWatcher::new(
        move |res: notify::Result<notify::Event>| {
            if let Ok(event) = res {
                let _ = watch_tx.blocking_send(event);
            }
        },
        NotifyConfig::default(),
    ) {
        Ok(w) => w,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to create config watcher");
            return;
        }
    };

    // Editors save by write-new + rename, which only the directory sees.
    let watch_dir = match path.parent() {
        Some(d) => d.to_path_buf(),
        None => {
            tracing::warn!(path = %path.display(), "Config path has no parent directory");
            return;
        }
    };

    if let Err(e) = std::fs::create_dir_all(&watch_dir) {
        tracing::warn!(error = %e, dir = %watch_dir.display(), "Failed to create config directory");
        return;
    }

    if let Err(e) = watcher.watch(&watch_dir, RecursiveMode::NonRecursive) {
        tracing::warn!(error = %e, "Failed to watch config directory");
        return;
    }

    while let Some(event) = watch_rx.recv().await {
        let affects_config = event.paths.iter().any(|p| p == path.as_path());
        let is_write = matches!(
            event.kind,
            notify::EventKind::Create(_) | notify::EventKind::Modify(_)
        );

        if affects_config && is_write {
            match load_or_default(&path) {
                Ok(config) => {
                    if tx.send(IndicatorEvent::ConfigReloaded(config)).is_err() {
                        break;
                    }
                }
                Err(e) => tracing::warn!(error = %e, "Failed to reload config"),
            }
        }
    }
}
