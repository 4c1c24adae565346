//! Authenticated request layer
//!
//! Every API call that needs the user's identity goes through
//! [`AuthenticatedClient::fetch`]. On a 401 it refreshes the access token
//! (when a refresh token exists) and reissues the original request exactly
//! once. It never loops.

use std::sync::Arc;

use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::{Response, StatusCode};

use super::refresh::{RefreshCoordinator, RefreshMode};
use super::request::RequestOptions;
use crate::config::ClientConfig;
use crate::constants::api;
use crate::error::{CoreError, Result};
use crate::storage::SessionStore;

#[derive(Debug, Clone)]
pub struct AuthenticatedClient {
    http: reqwest::Client,
    base_url: Arc<str>,
    session: SessionStore,
    refresher: Arc<RefreshCoordinator>,
}

impl AuthenticatedClient {
    pub fn new(config: &ClientConfig, session: SessionStore) -> Result<Self> {
        let http = config.http_client()?;
        Ok(Self::with_http_client(
            http,
            config.base_url(),
            session,
            config.refresh_mode,
        ))
    }

    pub fn with_http_client(
        http: reqwest::Client,
        base_url: &str,
        session: SessionStore,
        refresh_mode: RefreshMode,
    ) -> Self {
        Self {
            http,
            base_url: Arc::from(base_url.trim_end_matches('/')),
            session,
            refresher: Arc::new(RefreshCoordinator::new(refresh_mode)),
        }
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn refresh_mode(&self) -> RefreshMode {
        self.refresher.mode()
    }

    /// Absolute URL for an API path
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send a request with the stored bearer credential.
    ///
    /// Non-401 responses, and 401s without a refresh token, come back as-is.
    /// Otherwise the token is refreshed and the request reissued once; that
    /// second response is returned whatever its status. A failed refresh
    /// clears the session and yields [`CoreError::AuthFailure`] without
    /// retrying.
    pub async fn fetch(&self, path: &str, options: RequestOptions) -> Result<Response> {
        let response = self
            .send(path, &options, self.session.access_token())
            .await?;

        if response.status() != StatusCode::UNAUTHORIZED || self.session.refresh_token().is_none()
        {
            return Ok(response);
        }

        tracing::debug!(path, "Access token rejected, refreshing");
        let access = self
            .refresher
            .refresh(&self.http, self.url(api::REFRESH), &self.session)
            .await?;

        let retried = self.send(path, &options, Some(access)).await?;
        if retried.status() == StatusCode::UNAUTHORIZED {
            tracing::warn!(path, "Request still unauthorized after refresh");
        }
        Ok(retried)
    }

    /// Send a request without any credential (login, register, public key).
    pub async fn fetch_public(&self, path: &str, options: RequestOptions) -> Result<Response> {
        self.send(path, &options, None).await
    }

    async fn send(
        &self,
        path: &str,
        options: &RequestOptions,
        access_token: Option<String>,
    ) -> Result<Response> {
        if !path.starts_with('/') {
            return Err(CoreError::InvalidRequest(format!(
                "API path must be relative to the base URL: {}",
                path
            )));
        }

        let mut headers = options.headers.clone();
        if let Some(token) = access_token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token)).map_err(|_| {
                CoreError::InvalidRequest("access token is not a valid header value".to_string())
            })?;
            headers.insert(AUTHORIZATION, value);
        }

        let builder = self
            .http
            .request(options.method.clone(), self.url(path))
            .headers(headers);
        let response = options.apply_body(builder)?.send().await?;

        tracing::debug!(
            method = %options.method,
            path,
            status = response.status().as_u16(),
            "API request finished"
        );
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, session: SessionStore) -> AuthenticatedClient {
        AuthenticatedClient::with_http_client(
            reqwest::Client::new(),
            &server.uri(),
            session,
            RefreshMode::SingleFlight,
        )
    }

    async fn mount_refresh(server: &MockServer, status: u16, expected_calls: u64) {
        Mock::given(method("POST"))
            .and(path("/api/auth/refresh/"))
            .respond_with(
                ResponseTemplate::new(status)
                    .set_body_json(serde_json::json!({"access": "fresh", "refresh": "r2"})),
            )
            .expect(expected_calls)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn attaches_bearer_when_token_present() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/places/"))
            .and(header("Authorization", "Bearer a1"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let session = SessionStore::in_memory();
        session.set_tokens("a1", "r1").unwrap();
        let response = client_for(&server, session)
            .fetch("/api/places/", RequestOptions::get())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn omits_authorization_without_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/places/"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        client_for(&server, SessionStore::in_memory())
            .fetch("/api/places/", RequestOptions::get())
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].headers.get("authorization").is_none());
    }

    #[tokio::test]
    async fn keeps_caller_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/places/"))
            .and(header("X-Request-Id", "req-42"))
            .and(header("Authorization", "Bearer a1"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let session = SessionStore::in_memory();
        session.set_tokens("a1", "r1").unwrap();
        let options = RequestOptions::post()
            .header("X-Request-Id", "req-42")
            .unwrap()
            .json(&serde_json::json!({"name": "Library"}))
            .unwrap();
        let response = client_for(&server, session)
            .fetch("/api/places/", options)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn non_401_failure_is_returned_without_refresh() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/places/"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;
        mount_refresh(&server, 200, 0).await;

        let session = SessionStore::in_memory();
        session.set_tokens("a1", "r1").unwrap();
        let response = client_for(&server, session)
            .fetch("/api/places/", RequestOptions::get())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn unauthorized_without_refresh_token_is_returned() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/auth/me/"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        mount_refresh(&server, 200, 0).await;

        let session = SessionStore::in_memory();
        session.set(crate::storage::SessionKey::AccessToken, "a1").unwrap();
        let response = client_for(&server, session.clone())
            .fetch("/api/auth/me/", RequestOptions::get())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(session.access_token().as_deref(), Some("a1"));
    }

    #[tokio::test]
    async fn refreshes_once_and_retries_with_new_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/auth/me/"))
            .and(header("Authorization", "Bearer expired"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/auth/me/"))
            .and(header("Authorization", "Bearer fresh"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        mount_refresh(&server, 200, 1).await;

        let session = SessionStore::in_memory();
        session.set_tokens("expired", "r1").unwrap();
        let response = client_for(&server, session.clone())
            .fetch("/api/auth/me/", RequestOptions::get())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(session.access_token().as_deref(), Some("fresh"));
        assert_eq!(session.refresh_token().as_deref(), Some("r2"));
    }

    #[tokio::test]
    async fn retry_is_not_repeated_when_still_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/auth/me/"))
            .respond_with(ResponseTemplate::new(401))
            .expect(2)
            .mount(&server)
            .await;
        mount_refresh(&server, 200, 1).await;

        let session = SessionStore::in_memory();
        session.set_tokens("expired", "r1").unwrap();
        let response = client_for(&server, session)
            .fetch("/api/auth/me/", RequestOptions::get())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn failed_refresh_clears_session_and_skips_retry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/auth/me/"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        mount_refresh(&server, 401, 1).await;

        let session = SessionStore::in_memory();
        session.set_tokens("expired", "revoked").unwrap();
        session.set_username("alice").unwrap();
        session.set_is_moderator(true).unwrap();

        let err = client_for(&server, session.clone())
            .fetch("/api/auth/me/", RequestOptions::get())
            .await
            .unwrap_err();

        assert_eq!(err, CoreError::AuthFailure);
        assert_eq!(session.snapshot(), crate::storage::Session::default());
    }

    #[tokio::test]
    async fn json_body_is_replayed_on_retry() {
        let server = MockServer::start().await;
        let body = serde_json::json!({"endpoint": "https://push.example/abc"});
        Mock::given(method("DELETE"))
            .and(path("/api/push/subscriptions"))
            .and(header("Authorization", "Bearer expired"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/api/push/subscriptions"))
            .and(header("Authorization", "Bearer fresh"))
            .and(wiremock::matchers::body_json(body.clone()))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        mount_refresh(&server, 200, 1).await;

        let session = SessionStore::in_memory();
        session.set_tokens("expired", "r1").unwrap();
        let response = client_for(&server, session)
            .fetch(
                "/api/push/subscriptions",
                RequestOptions::delete().json(&body).unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn transport_failure_is_network_error() {
        let session = SessionStore::in_memory();
        session.set_tokens("a1", "r1").unwrap();
        let client = AuthenticatedClient::with_http_client(
            reqwest::Client::new(),
            "http://127.0.0.1:9",
            session.clone(),
            RefreshMode::SingleFlight,
        );

        let err = client
            .fetch("/api/auth/me/", RequestOptions::get())
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(session.is_authenticated());
    }

    async fn concurrent_unauthorized(mode: RefreshMode, expected_refreshes: u64) {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("Authorization", "Bearer expired"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(header("Authorization", "Bearer fresh"))
            .respond_with(ResponseTemplate::new(200))
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/auth/refresh/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"access": "fresh", "refresh": "r2"}))
                    .set_delay(std::time::Duration::from_millis(300)),
            )
            .expect(expected_refreshes)
            .mount(&server)
            .await;

        let session = SessionStore::in_memory();
        session.set_tokens("expired", "r1").unwrap();
        let client = AuthenticatedClient::with_http_client(
            reqwest::Client::new(),
            &server.uri(),
            session,
            mode,
        );

        let (places, events) = tokio::join!(
            client.fetch("/api/places/", RequestOptions::get()),
            client.fetch("/api/events/", RequestOptions::get()),
        );
        assert_eq!(places.unwrap().status(), StatusCode::OK);
        assert_eq!(events.unwrap().status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn single_flight_shares_one_refresh_between_concurrent_401s() {
        concurrent_unauthorized(RefreshMode::SingleFlight, 1).await;
    }

    #[tokio::test]
    async fn per_call_mode_refreshes_for_each_concurrent_401() {
        concurrent_unauthorized(RefreshMode::PerCall, 2).await;
    }

    #[tokio::test]
    async fn absolute_paths_are_rejected() {
        let client = AuthenticatedClient::with_http_client(
            reqwest::Client::new(),
            "http://localhost:8000/",
            SessionStore::in_memory(),
            RefreshMode::SingleFlight,
        );
        assert_eq!(client.url("/api/auth/me/"), "http://localhost:8000/api/auth/me/");

        let err = client
            .fetch("https://evil.example/", RequestOptions::get())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidRequest(_)));
    }
}
