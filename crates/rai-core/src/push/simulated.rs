//! In-process push host
//!
//! Stands in for the browser: a worker registry, a permission prompt with a
//! fixed answer, and a push service that mints endpoints and can deliver
//! payloads to an attached [`WorkerHandle`].

use std::collections::HashMap;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use parking_lot::Mutex;
use rand::Rng;

use super::platform::{PermissionState, PushPlatform, WorkerRegistration};
use super::types::{PushKeys, PushSubscription};
use crate::error::{CoreError, Result};
use crate::worker::WorkerHandle;

const PUSH_SERVICE_URL: &str = "https://push.simulated.invalid/send";

/// How often each host operation was invoked
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlatformCalls {
    pub register_worker: usize,
    pub request_permission: usize,
    pub subscribe: usize,
    pub unsubscribe: usize,
}

#[derive(Debug, Default)]
struct PlatformState {
    registrations: HashMap<String, WorkerRegistration>,
    /// Keyed by worker script URL; at most one per registration
    subscriptions: HashMap<String, PushSubscription>,
    application_server_key: Option<Vec<u8>>,
    calls: PlatformCalls,
}

#[derive(Debug)]
pub struct SimulatedPushPlatform {
    secure_context: bool,
    workers: bool,
    push: bool,
    notifications: bool,
    permission: PermissionState,
    subscribe_failure: Option<String>,
    worker: Option<WorkerHandle>,
    state: Mutex<PlatformState>,
}

impl Default for SimulatedPushPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedPushPlatform {
    /// Secure context, every API available, permission granted
    pub fn new() -> Self {
        Self {
            secure_context: true,
            workers: true,
            push: true,
            notifications: true,
            permission: PermissionState::Granted,
            subscribe_failure: None,
            worker: None,
            state: Mutex::new(PlatformState::default()),
        }
    }

    pub fn insecure(mut self) -> Self {
        self.secure_context = false;
        self
    }

    pub fn without_workers(mut self) -> Self {
        self.workers = false;
        self
    }

    pub fn without_push(mut self) -> Self {
        self.push = false;
        self
    }

    pub fn without_notifications(mut self) -> Self {
        self.notifications = false;
        self
    }

    /// Answer given to every permission prompt
    pub fn with_permission(mut self, permission: PermissionState) -> Self {
        self.permission = permission;
        self
    }

    /// Make the push service refuse new subscriptions
    pub fn failing_subscribe(mut self, reason: impl Into<String>) -> Self {
        self.subscribe_failure = Some(reason.into());
        self
    }

    /// Worker that receives lifecycle events and deliveries
    pub fn with_worker(mut self, worker: WorkerHandle) -> Self {
        self.worker = Some(worker);
        self
    }

    pub fn calls(&self) -> PlatformCalls {
        self.state.lock().calls.clone()
    }

    pub fn has_subscription(&self, script_url: &str) -> bool {
        self.state.lock().subscriptions.contains_key(script_url)
    }

    pub fn subscription(&self, script_url: &str) -> Option<PushSubscription> {
        self.state.lock().subscriptions.get(script_url).cloned()
    }

    /// Key the last subscription was created with
    pub fn application_server_key(&self) -> Option<Vec<u8>> {
        self.state.lock().application_server_key.clone()
    }

    /// Deliver a push body to the attached worker.
    ///
    /// Returns `false` when nothing is subscribed or no worker is attached.
    pub async fn deliver(&self, data: Option<Vec<u8>>) -> Result<bool> {
        if self.state.lock().subscriptions.is_empty() {
            tracing::debug!("Dropping push delivery, no active subscription");
            return Ok(false);
        }
        let Some(worker) = &self.worker else {
            return Ok(false);
        };
        worker.push(data).await?;
        Ok(true)
    }
}

#[async_trait]
impl PushPlatform for SimulatedPushPlatform {
    fn is_secure_context(&self) -> bool {
        self.secure_context
    }

    fn supports_workers(&self) -> bool {
        self.workers
    }

    fn supports_push(&self) -> bool {
        self.push
    }

    fn supports_notifications(&self) -> bool {
        self.notifications
    }

    async fn registration(&self, script_url: &str) -> Result<Option<WorkerRegistration>> {
        Ok(self.state.lock().registrations.get(script_url).cloned())
    }

    async fn register_worker(&self, script_url: &str) -> Result<WorkerRegistration> {
        let registration = {
            let mut state = self.state.lock();
            state.calls.register_worker += 1;
            let registration = WorkerRegistration {
                scope: "/".to_string(),
                script_url: script_url.to_string(),
            };
            state
                .registrations
                .insert(script_url.to_string(), registration.clone());
            registration
        };

        if let Some(worker) = &self.worker {
            worker.install().await?;
        }
        Ok(registration)
    }

    async fn request_permission(&self) -> Result<PermissionState> {
        self.state.lock().calls.request_permission += 1;
        Ok(self.permission)
    }

    async fn subscribe(
        &self,
        registration: &WorkerRegistration,
        application_server_key: &[u8],
    ) -> Result<PushSubscription> {
        let mut state = self.state.lock();
        state.calls.subscribe += 1;

        if let Some(reason) = &self.subscribe_failure {
            return Err(CoreError::NetworkFailure(reason.clone()));
        }
        if !state.registrations.contains_key(&registration.script_url) {
            return Err(CoreError::InvalidRequest(format!(
                "no worker registered for {}",
                registration.script_url
            )));
        }
        if let Some(existing) = state.subscriptions.get(&registration.script_url) {
            return Ok(existing.clone());
        }

        let subscription = mint_subscription();
        state.application_server_key = Some(application_server_key.to_vec());
        state
            .subscriptions
            .insert(registration.script_url.clone(), subscription.clone());
        Ok(subscription)
    }

    async fn current_subscription(
        &self,
        registration: &WorkerRegistration,
    ) -> Result<Option<PushSubscription>> {
        Ok(self
            .state
            .lock()
            .subscriptions
            .get(&registration.script_url)
            .cloned())
    }

    async fn unsubscribe(&self, registration: &WorkerRegistration) -> Result<bool> {
        let mut state = self.state.lock();
        state.calls.unsubscribe += 1;
        Ok(state
            .subscriptions
            .remove(&registration.script_url)
            .is_some())
    }
}

fn mint_subscription() -> PushSubscription {
    let mut rng = rand::thread_rng();

    let mut p256dh = [0u8; 65];
    rng.fill(&mut p256dh[..]);
    p256dh[0] = 0x04;
    let mut auth = [0u8; 16];
    rng.fill(&mut auth[..]);

    PushSubscription {
        endpoint: format!("{}/{}", PUSH_SERVICE_URL, uuid::Uuid::new_v4()),
        expiration_time: None,
        keys: PushKeys {
            p256dh: URL_SAFE_NO_PAD.encode(p256dh),
            auth: URL_SAFE_NO_PAD.encode(auth),
        },
    }
}
