//! Client session and push-notification core for the RAI accessibility map
//!
//! - `storage`: session fields (credentials, cached profile, unread flag)
//! - `auth`: authenticated requests with refresh-and-retry-once, account operations
//! - `push`: Web Push subscription lifecycle against the backend
//! - `worker`: background worker state machine (install, activate, push, click)
//! - `notifier`: worker-to-foreground broadcast and the unread indicator

pub mod auth;
pub mod config;
pub mod constants;
pub mod error;
pub mod notifier;
pub mod paths;
pub mod push;
pub mod storage;
pub mod worker;

pub use auth::{AuthService, AuthenticatedClient, RefreshMode, RequestOptions};
pub use config::ClientConfig;
pub use error::{CoreError, Result};
pub use notifier::{ForegroundNotifier, PushBroadcaster, WorkerMessage};
pub use push::PushSubscriptionManager;
pub use storage::SessionStore;
pub use worker::{BackgroundWorkerRuntime, WorkerHandle};
