/// Canonical file paths for the indicator.
///
///   - config.toml  `$XDG_CONFIG_HOME/gamemode-indicator/`, written by the user or a prefs UI.
///   - status.toml  `$XDG_RUNTIME_DIR/gamemode-indicator/`, written by the indicator for
///                  panels and bars to read. Falls back to the config directory.
use std::path::PathBuf;

const APP_DIR_NAME: &str = "gamemode-indicator";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const STATUS_FILE_NAME: &str = "status.toml";

/// `$XDG_CONFIG_HOME/gamemode-indicator`, or the temp directory when no home is known.
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_DIR_NAME)
}

/// `$XDG_RUNTIME_DIR/gamemode-indicator`, falling back to [`config_dir`].
pub fn runtime_dir() -> PathBuf {
    dirs::runtime_dir()
        .map(|d| d.join(APP_DIR_NAME))
        .unwrap_or_else(config_dir)
}

pub fn config_file_path() -> PathBuf {
    config_dir().join(CONFIG_FILE_NAME)
}

pub fn status_file_path() -> PathBuf {
    runtime_dir().join(STATUS_FILE_NAME)
}
