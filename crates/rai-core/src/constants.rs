//! Constants used throughout the session core
//!
//! Centralized location for endpoint paths, defaults and notification values.

/// Backend REST endpoints, relative to the configured base URL
pub mod api {
    pub const LOGIN: &str = "/api/auth/login/";
    pub const REGISTER: &str = "/api/auth/register/";
    pub const ME: &str = "/api/auth/me/";
    pub const ME_UPDATE: &str = "/api/auth/me/update/";
    pub const REFRESH: &str = "/api/auth/refresh/";
    pub const PUSH_PUBLIC_KEY: &str = "/api/push/public-key";
    pub const PUSH_SUBSCRIPTIONS: &str = "/api/push/subscriptions";
    pub const PUSH_NOTIFY: &str = "/api/push/notify";
}

/// Client configuration defaults
pub mod config {
    pub const CONFIG_DIR_NAME: &str = ".rai";
    pub const CONFIG_FILE_NAME: &str = "config.toml";
    pub const SESSION_FILE_NAME: &str = "session.json";
    pub const LOG_FILE_NAME: &str = "rai.log";
    pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000";
    pub const DEFAULT_WORKER_SCRIPT: &str = "/sw.js";
    pub const USER_AGENT: &str = concat!("rai/", env!("CARGO_PKG_VERSION"));
}

/// Values used when rendering a push notification
pub mod notification {
    /// Fallback title when the push payload is missing or malformed
    pub const DEFAULT_TITLE: &str = "New notification";
    pub const DEFAULT_BODY: &str = "You have a new notification";
    pub const DEFAULT_URL: &str = "/";
    /// One tag for every notification, so a newer push replaces the visible one
    pub const TAG: &str = "rai-push";
    pub const ICON: &str = "/vite.svg";
    pub const BADGE: &str = "/vite.svg";
}

/// Channel sizing
pub mod channels {
    /// Buffered messages per foreground subscriber before it starts lagging
    pub const BROADCAST_CAPACITY: usize = 64;
    pub const SESSION_CHANGES_CAPACITY: usize = 64;
}
