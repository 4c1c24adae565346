//! Client configuration
//!
//! Loaded from `~/.rai/config.toml` (every field optional), then overridden
//! by `RAI_*` environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::auth::RefreshMode;
use crate::constants::config;
use crate::paths;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Backend origin, e.g. `https://rai.example.org`
    pub api_base_url: String,
    /// Where the session is persisted (defaults to ~/.rai/session.json)
    pub session_path: Option<PathBuf>,
    /// How concurrent 401s share a token refresh
    pub refresh_mode: RefreshMode,
    /// Script URL the background worker is registered under
    pub worker_script: String,
    /// Per-request timeout. Unset means requests may hang indefinitely.
    pub request_timeout_secs: Option<u64>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: config::DEFAULT_API_BASE_URL.to_string(),
            session_path: None,
            refresh_mode: RefreshMode::default(),
            worker_script: config::DEFAULT_WORKER_SCRIPT.to_string(),
            request_timeout_secs: None,
        }
    }
}

impl ClientConfig {
    /// Load from the default config file and apply environment overrides
    pub fn load() -> Result<Self> {
        Ok(Self::load_from_path(&paths::config_path())?
            .with_overrides(|name| std::env::var(name).ok()))
    }

    /// Load from a specific file. A missing file yields the defaults.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Apply `RAI_API_BASE_URL`, `RAI_SESSION_PATH` and `RAI_REFRESH_MODE`.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(url) = non_empty("RAI_API_BASE_URL") {
            self.api_base_url = url;
        }
        if let Some(path) = non_empty("RAI_SESSION_PATH") {
            self.session_path = Some(PathBuf::from(path));
        }
        if let Some(mode) = non_empty("RAI_REFRESH_MODE") {
            match mode.parse() {
                Ok(mode) => self.refresh_mode = mode,
                Err(e) => tracing::warn!("Ignoring RAI_REFRESH_MODE: {}", e),
            }
        }
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    /// Base URL without a trailing slash, ready for `{base}{path}`
    pub fn base_url(&self) -> &str {
        self.api_base_url.trim_end_matches('/')
    }

    pub fn session_path(&self) -> PathBuf {
        self.session_path
            .clone()
            .unwrap_or_else(paths::session_path)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    /// Build the HTTP client shared by every request this config drives
    pub fn http_client(&self) -> reqwest::Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder().user_agent(config::USER_AGENT);
        if let Some(timeout) = self.request_timeout() {
            builder = builder.timeout(timeout);
        }
        builder.build()
    }
}
