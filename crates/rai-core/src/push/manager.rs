//! Push subscription lifecycle
//!
//! Orchestrates the handshake between the host push service and the backend:
//! capability checks, worker registration, permission, key exchange, and the
//! server-side mirror of the subscription keyed by endpoint.

use std::sync::Arc;

use super::platform::{
    ensure_notifications, ensure_push_environment, PermissionState, PushPlatform,
    WorkerRegistration,
};
use super::types::{
    NotifyReport, PublicKeyResponse, PushSubscription, SubscriptionList, SubscriptionRecord,
    TestNotification, UnsubscribeRequest,
};
use super::vapid::decode_application_server_key;
use crate::auth::{AuthenticatedClient, RequestOptions};
use crate::constants::api;
use crate::error::{rejection, CoreError, Result};

#[derive(Debug, Clone)]
pub struct PushSubscriptionManager {
    client: AuthenticatedClient,
    platform: Arc<dyn PushPlatform>,
    worker_script: String,
}

impl PushSubscriptionManager {
    pub fn new(
        client: AuthenticatedClient,
        platform: Arc<dyn PushPlatform>,
        worker_script: impl Into<String>,
    ) -> Self {
        Self {
            client,
            platform,
            worker_script: worker_script.into(),
        }
    }

    pub fn worker_script(&self) -> &str {
        &self.worker_script
    }

    /// Subscribe this host to push and register the endpoint with the server.
    ///
    /// When the server refuses to store the subscription, the local one is
    /// dropped again before the error is returned.
    pub async fn subscribe(&self) -> Result<PushSubscription> {
        ensure_push_environment(self.platform.as_ref())?;

        let registration = self.ensure_registration().await?;

        ensure_notifications(self.platform.as_ref())?;
        match self.platform.request_permission().await? {
            PermissionState::Granted => {}
            state => {
                tracing::info!(?state, "Notification permission not granted");
                return Err(CoreError::PermissionDenied);
            }
        }

        let key = self.public_key().await?;
        let application_server_key = decode_application_server_key(&key)?;

        let subscription = self
            .platform
            .subscribe(&registration, &application_server_key)
            .await?;

        if let Err(e) = self.save_subscription(&subscription).await {
            tracing::warn!(
                endpoint = %subscription.endpoint,
                error = %e,
                "Server did not store push subscription, rolling back"
            );
            if let Err(rollback) = self.platform.unsubscribe(&registration).await {
                tracing::warn!(error = %rollback, "Failed to drop local push subscription");
            }
            return Err(e);
        }

        tracing::info!(endpoint = %subscription.endpoint, "Push subscription active");
        Ok(subscription)
    }

    /// Remove the subscription from the server, then locally.
    ///
    /// Returns `false` without any network call when nothing is subscribed.
    pub async fn unsubscribe(&self) -> Result<bool> {
        ensure_push_environment(self.platform.as_ref())?;

        let Some(registration) = self.platform.registration(&self.worker_script).await? else {
            return Ok(false);
        };
        let Some(subscription) = self.platform.current_subscription(&registration).await? else {
            return Ok(false);
        };

        let body = UnsubscribeRequest {
            endpoint: &subscription.endpoint,
        };
        let response = self
            .client
            .fetch(
                api::PUSH_SUBSCRIPTIONS,
                RequestOptions::delete().json(&body)?,
            )
            .await?;
        if !response.status().is_success() {
            tracing::warn!(
                endpoint = %subscription.endpoint,
                status = response.status().as_u16(),
                "Server did not delete push subscription"
            );
        }

        self.platform.unsubscribe(&registration).await?;
        tracing::info!(endpoint = %subscription.endpoint, "Push subscription removed");
        Ok(true)
    }

    /// Moderator-only broadcast of a notification to every subscriber.
    pub async fn send_test_notification(
        &self,
        notification: &TestNotification,
    ) -> Result<NotifyReport> {
        let response = self
            .client
            .fetch(api::PUSH_NOTIFY, RequestOptions::post().json(notification)?)
            .await?;
        if !response.status().is_success() {
            return Err(rejection(response, "Failed to send push notification").await);
        }

        // The report is informational; an empty or non-JSON body still means accepted
        let body = response.bytes().await?;
        let report: NotifyReport = if body.is_empty() {
            NotifyReport::default()
        } else {
            serde_json::from_slice(&body).unwrap_or_else(|e| {
                tracing::debug!(error = %e, "Unreadable notify report");
                NotifyReport::default()
            })
        };
        tracing::info!(
            kind = %notification.kind,
            sent = report.delivery.sent,
            failed = report.delivery.failed,
            "Test notification sent"
        );
        Ok(report)
    }

    /// Subscriptions the server holds for the signed-in user
    pub async fn list_subscriptions(&self) -> Result<Vec<SubscriptionRecord>> {
        let response = self
            .client
            .fetch(api::PUSH_SUBSCRIPTIONS, RequestOptions::get())
            .await?;
        if !response.status().is_success() {
            return Err(rejection(response, "Failed to load push subscriptions").await);
        }
        let list: SubscriptionList = response.json().await?;
        Ok(list.items)
    }

    /// The server's VAPID public key, as published (base64url)
    pub async fn public_key(&self) -> Result<String> {
        let response = self
            .client
            .fetch_public(api::PUSH_PUBLIC_KEY, RequestOptions::get())
            .await?;
        if !response.status().is_success() {
            return Err(CoreError::ServerMisconfigured(format!(
                "public key endpoint answered {}",
                response.status().as_u16()
            )));
        }

        let body: PublicKeyResponse = response.json().await.map_err(|e| {
            CoreError::ServerMisconfigured(format!("unreadable public key response: {}", e))
        })?;
        if body.public_key.trim().is_empty() {
            return Err(CoreError::ServerMisconfigured(
                "push public key is empty".to_string(),
            ));
        }
        Ok(body.public_key)
    }

    async fn ensure_registration(&self) -> Result<WorkerRegistration> {
        if let Some(existing) = self.platform.registration(&self.worker_script).await? {
            return Ok(existing);
        }
        tracing::debug!(script = %self.worker_script, "Registering background worker");
        self.platform.register_worker(&self.worker_script).await
    }

    async fn save_subscription(&self, subscription: &PushSubscription) -> Result<()> {
        let response = self
            .client
            .fetch(
                api::PUSH_SUBSCRIPTIONS,
                RequestOptions::post().json(subscription)?,
            )
            .await?;
        if !response.status().is_success() {
            return Err(rejection(response, "Failed to save push subscription").await);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::RefreshMode;
    use crate::push::simulated::SimulatedPushPlatform;
    use crate::storage::SessionStore;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine as _;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn vapid_key() -> String {
        let mut key = vec![0x04u8];
        key.extend(std::iter::repeat(0x11).take(64));
        URL_SAFE_NO_PAD.encode(key)
    }

    fn manager(server_uri: &str, platform: Arc<SimulatedPushPlatform>) -> PushSubscriptionManager {
        let session = SessionStore::in_memory();
        session.set_tokens("a1", "r1").unwrap();
        let client = AuthenticatedClient::with_http_client(
            reqwest::Client::new(),
            server_uri,
            session,
            RefreshMode::SingleFlight,
        );
        PushSubscriptionManager::new(client, platform, "/sw.js")
    }

    async fn mount_public_key(server: &MockServer, key: &str) {
        Mock::given(method("GET"))
            .and(path("/api/push/public-key"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"publicKey": key})),
            )
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn subscribe_registers_and_saves_subscription() {
        let server = MockServer::start().await;
        mount_public_key(&server, &vapid_key()).await;
        Mock::given(method("POST"))
            .and(path("/api/push/subscriptions"))
            .and(header("Authorization", "Bearer a1"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({"id": 1})))
            .expect(1)
            .mount(&server)
            .await;

        let platform = Arc::new(SimulatedPushPlatform::new());
        let manager = manager(&server.uri(), platform.clone());
        let subscription = manager.subscribe().await.unwrap();

        assert_eq!(platform.calls().register_worker, 1);
        assert_eq!(platform.calls().request_permission, 1);
        assert!(platform.has_subscription("/sw.js"));

        let requests = server.received_requests().await.unwrap();
        let saved: PushSubscription = serde_json::from_slice(&requests[1].body).unwrap();
        assert_eq!(saved, subscription);
    }

    #[tokio::test]
    async fn subscribe_reuses_existing_registration() {
        let server = MockServer::start().await;
        mount_public_key(&server, &vapid_key()).await;
        Mock::given(method("POST"))
            .and(path("/api/push/subscriptions"))
            .respond_with(ResponseTemplate::new(201))
            .mount(&server)
            .await;

        let platform = Arc::new(SimulatedPushPlatform::new());
        let manager = manager(&server.uri(), platform.clone());
        let first = manager.subscribe().await.unwrap();
        let second = manager.subscribe().await.unwrap();

        assert_eq!(platform.calls().register_worker, 1);
        assert_eq!(first.endpoint, second.endpoint);
    }

    #[tokio::test]
    async fn insecure_context_fails_before_registration() {
        let server = MockServer::start().await;
        let platform = Arc::new(SimulatedPushPlatform::new().insecure());
        let err = manager(&server.uri(), platform.clone())
            .subscribe()
            .await
            .unwrap_err();

        assert_eq!(
            err,
            CoreError::EnvironmentUnsupported("Push requires HTTPS or localhost".into())
        );
        assert_eq!(platform.calls().register_worker, 0);
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_capabilities_fail_before_permission() {
        let server = MockServer::start().await;
        for (platform, reason) in [
            (
                SimulatedPushPlatform::new().without_workers(),
                "Service workers are not supported by this browser",
            ),
            (
                SimulatedPushPlatform::new().without_push(),
                "The Push API is not supported by this browser",
            ),
        ] {
            let platform = Arc::new(platform);
            let err = manager(&server.uri(), platform.clone())
                .subscribe()
                .await
                .unwrap_err();
            assert_eq!(err, CoreError::EnvironmentUnsupported(reason.into()));
            assert_eq!(platform.calls().request_permission, 0);
            assert_eq!(platform.calls().register_worker, 0);
        }
    }

    #[tokio::test]
    async fn missing_notification_api_fails_before_prompt() {
        let server = MockServer::start().await;
        let platform = Arc::new(SimulatedPushPlatform::new().without_notifications());
        let err = manager(&server.uri(), platform.clone())
            .subscribe()
            .await
            .unwrap_err();

        assert_eq!(
            err.user_message(),
            "Notifications are not supported by this browser"
        );
        assert_eq!(platform.calls().register_worker, 1);
        assert_eq!(platform.calls().request_permission, 0);
        assert!(platform.subscription("/sw.js").is_none());
    }

    #[tokio::test]
    async fn denied_permission_stops_before_key_fetch() {
        let server = MockServer::start().await;
        let platform =
            Arc::new(SimulatedPushPlatform::new().with_permission(PermissionState::Denied));
        let err = manager(&server.uri(), platform.clone())
            .subscribe()
            .await
            .unwrap_err();

        assert_eq!(err, CoreError::PermissionDenied);
        assert!(server.received_requests().await.unwrap().is_empty());
        assert_eq!(platform.calls().subscribe, 0);
    }

    #[tokio::test]
    async fn empty_public_key_is_server_misconfiguration() {
        let server = MockServer::start().await;
        mount_public_key(&server, "").await;

        let platform = Arc::new(SimulatedPushPlatform::new());
        let err = manager(&server.uri(), platform.clone())
            .subscribe()
            .await
            .unwrap_err();

        assert!(matches!(err, CoreError::ServerMisconfigured(_)));
        assert_eq!(platform.calls().subscribe, 0);
    }

    #[tokio::test]
    async fn rejected_save_rolls_back_local_subscription() {
        let server = MockServer::start().await;
        mount_public_key(&server, &vapid_key()).await;
        Mock::given(method("POST"))
            .and(path("/api/push/subscriptions"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(serde_json::json!({"error": "Invalid subscription payload"})),
            )
            .mount(&server)
            .await;

        let platform = Arc::new(SimulatedPushPlatform::new());
        let err = manager(&server.uri(), platform.clone())
            .subscribe()
            .await
            .unwrap_err();

        assert_eq!(err.user_message(), "Invalid subscription payload");
        assert!(!platform.has_subscription("/sw.js"));
        assert_eq!(platform.calls().unsubscribe, 1);
    }

    #[tokio::test]
    async fn push_service_failure_propagates() {
        let server = MockServer::start().await;
        mount_public_key(&server, &vapid_key()).await;

        let platform =
            Arc::new(SimulatedPushPlatform::new().failing_subscribe("push service down"));
        let err = manager(&server.uri(), platform)
            .subscribe()
            .await
            .unwrap_err();

        assert!(matches!(err, CoreError::NetworkFailure(_)));
        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
    }

    #[tokio::test]
    async fn unsubscribe_without_subscription_is_a_no_op() {
        let server = MockServer::start().await;
        let platform = Arc::new(SimulatedPushPlatform::new());
        let removed = manager(&server.uri(), platform).unsubscribe().await.unwrap();

        assert!(!removed);
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unsubscribe_deletes_on_server_then_locally() {
        let server = MockServer::start().await;
        mount_public_key(&server, &vapid_key()).await;
        Mock::given(method("POST"))
            .and(path("/api/push/subscriptions"))
            .respond_with(ResponseTemplate::new(201))
            .mount(&server)
            .await;

        let platform = Arc::new(SimulatedPushPlatform::new());
        let manager = manager(&server.uri(), platform.clone());
        let subscription = manager.subscribe().await.unwrap();

        Mock::given(method("DELETE"))
            .and(path("/api/push/subscriptions"))
            .and(body_json(serde_json::json!({"endpoint": subscription.endpoint})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"deleted": 1})),
            )
            .expect(1)
            .mount(&server)
            .await;

        assert!(manager.unsubscribe().await.unwrap());
        assert!(!platform.has_subscription("/sw.js"));
    }

    #[tokio::test]
    async fn server_delete_failure_still_unsubscribes_locally() {
        let server = MockServer::start().await;
        mount_public_key(&server, &vapid_key()).await;
        Mock::given(method("POST"))
            .and(path("/api/push/subscriptions"))
            .respond_with(ResponseTemplate::new(201))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/api/push/subscriptions"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let platform = Arc::new(SimulatedPushPlatform::new());
        let manager = manager(&server.uri(), platform.clone());
        manager.subscribe().await.unwrap();

        assert!(manager.unsubscribe().await.unwrap());
        assert!(!platform.has_subscription("/sw.js"));
    }

    #[tokio::test]
    async fn unreachable_server_keeps_local_subscription() {
        let server = MockServer::start().await;
        mount_public_key(&server, &vapid_key()).await;
        Mock::given(method("POST"))
            .and(path("/api/push/subscriptions"))
            .respond_with(ResponseTemplate::new(201))
            .mount(&server)
            .await;

        let platform = Arc::new(SimulatedPushPlatform::new());
        manager(&server.uri(), platform.clone()).subscribe().await.unwrap();

        // Nothing listens on a port freed right after binding
        let dead_port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let offline = manager(&format!("http://127.0.0.1:{}", dead_port), platform.clone());

        let err = offline.unsubscribe().await.unwrap_err();
        assert!(matches!(err, CoreError::NetworkFailure(_)));
        assert!(platform.has_subscription("/sw.js"));
        assert_eq!(platform.calls().unsubscribe, 0);
    }

    #[tokio::test]
    async fn send_test_notification_posts_typed_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/push/notify"))
            .and(body_json(serde_json::json!({
                "type": "new_place",
                "title": "New cafe",
                "body": "Step-free entrance",
                "url": "/places/9"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "payload": {
                    "type": "new_place",
                    "title": "New cafe",
                    "body": "Step-free entrance",
                    "url": "/places/9"
                },
                "delivery": {"sent": 3, "failed": 0, "removed": 1, "errors": []}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let platform = Arc::new(SimulatedPushPlatform::new());
        let notification = TestNotification::new(
            crate::push::NotificationType::NewPlace,
            "New cafe",
            "Step-free entrance",
        )
        .with_url("/places/9");
        let report = manager(&server.uri(), platform.clone())
            .send_test_notification(&notification)
            .await
            .unwrap();

        assert_eq!(report.delivery.sent, 3);
        assert_eq!(report.delivery.removed, 1);
        assert_eq!(platform.calls(), Default::default());
    }

    #[tokio::test]
    async fn send_test_notification_surfaces_forbidden_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/push/notify"))
            .respond_with(
                ResponseTemplate::new(403)
                    .set_body_json(serde_json::json!({"error": "Moderator permissions required"})),
            )
            .mount(&server)
            .await;

        let platform = Arc::new(SimulatedPushPlatform::new());
        let err = manager(&server.uri(), platform)
            .send_test_notification(&TestNotification::new(
                Default::default(),
                "Hello",
                "World",
            ))
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(403));
        assert_eq!(err.user_message(), "Moderator permissions required");
    }

    #[tokio::test]
    async fn send_test_notification_accepts_empty_success_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/push/notify"))
            .respond_with(ResponseTemplate::new(204))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/push/notify"))
            .respond_with(ResponseTemplate::new(200).set_body_string("queued"))
            .expect(1)
            .mount(&server)
            .await;

        let platform = Arc::new(SimulatedPushPlatform::new());
        let manager = manager(&server.uri(), platform);
        let notification = TestNotification::new(Default::default(), "Hello", "World");

        let report = manager.send_test_notification(&notification).await.unwrap();
        assert_eq!(report.delivery, Default::default());
        assert!(report.payload.is_none());

        let report = manager.send_test_notification(&notification).await.unwrap();
        assert_eq!(report.delivery.sent, 0);
    }

    #[tokio::test]
    async fn lists_server_subscriptions() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/push/subscriptions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [
                    {
                        "id": 2,
                        "endpoint": "https://push.example/b",
                        "created_at": "2026-03-01T10:00:00Z",
                        "updated_at": "2026-03-02T10:00:00Z"
                    },
                    {
                        "id": 1,
                        "endpoint": "https://push.example/a",
                        "created_at": "2026-02-01T10:00:00Z",
                        "updated_at": "2026-02-01T10:00:00Z"
                    }
                ]
            })))
            .mount(&server)
            .await;

        let platform = Arc::new(SimulatedPushPlatform::new());
        let items = manager(&server.uri(), platform)
            .list_subscriptions()
            .await
            .unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].endpoint, "https://push.example/b");
    }
}
