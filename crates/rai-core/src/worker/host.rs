//! What the background worker needs from its host

use std::fmt::Debug;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Data attached to a displayed notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationData {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationOptions {
    pub body: String,
    pub tag: String,
    pub icon: String,
    pub badge: String,
    pub data: NotificationData,
}

/// A notification as currently shown by the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayedNotification {
    pub id: u64,
    pub title: String,
    pub options: NotificationOptions,
}

/// System notification area
#[async_trait]
pub trait NotificationSurface: Send + Sync + Debug {
    /// Show a notification; one with the same tag is replaced, not stacked.
    async fn show_notification(
        &self,
        title: &str,
        options: NotificationOptions,
    ) -> Result<DisplayedNotification>;

    async fn close_notification(&self, id: u64) -> Result<()>;
}

/// An open window of this origin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowClient {
    pub id: String,
    pub url: String,
    /// Whether the host lets the worker focus this window
    pub focusable: bool,
    /// Whether this worker already serves the window
    pub controlled: bool,
}

/// Open windows of the origin, as seen from the worker
#[async_trait]
pub trait WindowClients: Send + Sync + Debug {
    async fn match_all(&self, include_uncontrolled: bool) -> Result<Vec<WindowClient>>;

    /// Take control of every open window without a reload
    async fn claim(&self) -> Result<()>;

    /// Navigate a window in place. Hosts without in-place navigation
    /// return [`crate::error::CoreError::EnvironmentUnsupported`].
    async fn navigate(&self, client_id: &str, url: &str) -> Result<()>;

    async fn focus(&self, client_id: &str) -> Result<()>;

    fn can_open_window(&self) -> bool;

    /// Open a new window, returning its id
    async fn open_window(&self, url: &str) -> Result<String>;
}
