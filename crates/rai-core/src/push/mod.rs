//! Web Push subscription lifecycle
//!
//! - [`PushSubscriptionManager`] runs subscribe / unsubscribe / test sends
//! - [`PushPlatform`] is the host seam (secure context, worker registry,
//!   permission prompt, push service)
//! - [`SimulatedPushPlatform`] is an in-process host for tests and headless use

mod manager;
mod platform;
mod simulated;
mod types;
mod vapid;

pub use manager::PushSubscriptionManager;
pub use platform::{ensure_push_environment, PermissionState, PushPlatform, WorkerRegistration};
pub use simulated::{PlatformCalls, SimulatedPushPlatform};
pub use types::{
    DeliveryReport, NotificationPayload, NotificationType, NotifyReport, PublicKeyResponse,
    PushKeys, PushSubscription, SubscriptionList, SubscriptionRecord, TestNotification,
    UnsubscribeRequest,
};
pub use vapid::decode_application_server_key;
