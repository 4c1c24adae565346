//! Centralized path utilities
//!
//! All client-side paths in one place for consistency

use std::path::PathBuf;

use crate::constants::config;

/// Get the config directory (~/.rai)
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(config::CONFIG_DIR_NAME)
}

/// Get the logs directory (~/.rai/logs)
pub fn logs_dir() -> PathBuf {
    config_dir().join("logs")
}

/// Get the config file (~/.rai/config.toml)
pub fn config_path() -> PathBuf {
    config_dir().join(config::CONFIG_FILE_NAME)
}

/// Get the persisted session file (~/.rai/session.json)
pub fn session_path() -> PathBuf {
    config_dir().join(config::SESSION_FILE_NAME)
}
