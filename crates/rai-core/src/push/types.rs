//! Push wire types shared by the browser side, the backend and the worker

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::notification;
use crate::error::{CoreError, Result};

/// Keys the push service uses to encrypt messages for one endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushKeys {
    pub p256dh: String,
    pub auth: String,
}

/// A browser push registration, `{endpoint, keys: {p256dh, auth}}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushSubscription {
    pub endpoint: String,
    #[serde(
        rename = "expirationTime",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub expiration_time: Option<u64>,
    pub keys: PushKeys,
}

/// Body of DELETE /api/push/subscriptions
#[derive(Debug, Clone, Serialize)]
pub struct UnsubscribeRequest<'a> {
    pub endpoint: &'a str,
}

/// Response of GET /api/push/public-key
#[derive(Debug, Clone, Deserialize)]
pub struct PublicKeyResponse {
    #[serde(rename = "publicKey", default)]
    pub public_key: String,
}

/// Server-side mirror of a subscription
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SubscriptionRecord {
    pub id: i64,
    pub endpoint: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionList {
    #[serde(default)]
    pub items: Vec<SubscriptionRecord>,
}

/// Category of a moderator-sent notification
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    NewPlace,
    RouteOpening,
    Event,
    Discount,
    #[default]
    General,
}

impl NotificationType {
    pub const ALL: [NotificationType; 5] = [
        Self::NewPlace,
        Self::RouteOpening,
        Self::Event,
        Self::Discount,
        Self::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NewPlace => "new_place",
            Self::RouteOpening => "route_opening",
            Self::Event => "event",
            Self::Discount => "discount",
            Self::General => "general",
        }
    }
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| format!("unknown notification type '{}'", s))
    }
}

/// Body of POST /api/push/notify
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestNotification {
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub title: String,
    pub body: String,
    pub url: String,
}

impl TestNotification {
    pub fn new(kind: NotificationType, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.into(),
            body: body.into(),
            url: notification::DEFAULT_URL.to_string(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

/// Per-send delivery counters reported by the backend
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DeliveryReport {
    pub sent: u64,
    pub failed: u64,
    pub removed: u64,
    pub errors: Vec<String>,
}

/// Response of POST /api/push/notify
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NotifyReport {
    pub payload: Option<NotificationPayload>,
    pub delivery: DeliveryReport,
}

/// Message carried by one push delivery.
///
/// Every field is optional on the wire; absent fields keep the defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationPayload {
    pub title: String,
    pub body: String,
    pub url: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl Default for NotificationPayload {
    fn default() -> Self {
        Self {
            title: notification::DEFAULT_TITLE.to_string(),
            body: notification::DEFAULT_BODY.to_string(),
            url: notification::DEFAULT_URL.to_string(),
            category: None,
        }
    }
}

impl NotificationPayload {
    /// Strict parse of a push body. No body yields the defaults.
    pub fn parse(data: Option<&[u8]>) -> Result<Self> {
        match data {
            None => Ok(Self::default()),
            Some(bytes) => serde_json::from_slice(bytes)
                .map_err(|e| CoreError::PayloadMalformed(e.to_string())),
        }
    }

    /// Parse a push body, substituting the defaults when it is malformed.
    pub fn from_push_data(data: Option<&[u8]>) -> Self {
        Self::parse(data).unwrap_or_else(|e| {
            tracing::debug!(error = %e, "Using default notification payload");
            Self::default()
        })
    }

    /// Click target; an empty url falls back to the root
    pub fn target_url(&self) -> &str {
        if self.url.is_empty() {
            notification::DEFAULT_URL
        } else {
            &self.url
        }
    }
}
