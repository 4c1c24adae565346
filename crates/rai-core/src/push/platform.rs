//! Host push capabilities
//!
//! The browser pieces the subscription flow depends on (secure context,
//! worker registry, permission prompt, push service) behind one trait.

use std::fmt::Debug;

use async_trait::async_trait;

use super::types::PushSubscription;
use crate::error::{CoreError, Result};

/// Answer to the notification permission prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionState {
    Granted,
    Denied,
    /// Prompt dismissed without a choice
    Default,
}

/// A background worker registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerRegistration {
    pub scope: String,
    pub script_url: String,
}

#[async_trait]
pub trait PushPlatform: Send + Sync + Debug {
    /// HTTPS or localhost
    fn is_secure_context(&self) -> bool;

    fn supports_workers(&self) -> bool;

    fn supports_push(&self) -> bool;

    fn supports_notifications(&self) -> bool;

    /// Existing registration for `script_url`, if any
    async fn registration(&self, script_url: &str) -> Result<Option<WorkerRegistration>>;

    async fn register_worker(&self, script_url: &str) -> Result<WorkerRegistration>;

    async fn request_permission(&self) -> Result<PermissionState>;

    /// Create (or return the existing) subscription for `registration`
    async fn subscribe(
        &self,
        registration: &WorkerRegistration,
        application_server_key: &[u8],
    ) -> Result<PushSubscription>;

    async fn current_subscription(
        &self,
        registration: &WorkerRegistration,
    ) -> Result<Option<PushSubscription>>;

    /// Drop the local subscription. Returns whether one existed.
    async fn unsubscribe(&self, registration: &WorkerRegistration) -> Result<bool>;
}

/// Check push capabilities in order, failing on the first one missing.
pub fn ensure_push_environment(platform: &dyn PushPlatform) -> Result<()> {
    if !platform.is_secure_context() {
        return Err(CoreError::EnvironmentUnsupported(
            "Push requires HTTPS or localhost".to_string(),
        ));
    }
    if !platform.supports_workers() {
        return Err(CoreError::EnvironmentUnsupported(
            "Service workers are not supported by this browser".to_string(),
        ));
    }
    if !platform.supports_push() {
        return Err(CoreError::EnvironmentUnsupported(
            "The Push API is not supported by this browser".to_string(),
        ));
    }
    Ok(())
}

pub(crate) fn ensure_notifications(platform: &dyn PushPlatform) -> Result<()> {
    if platform.supports_notifications() {
        Ok(())
    } else {
        Err(CoreError::EnvironmentUnsupported(
            "Notifications are not supported by this browser".to_string(),
        ))
    }
}
