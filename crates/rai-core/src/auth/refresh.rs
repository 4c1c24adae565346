//! Access token refresh
//!
//! Two modes:
//! - `SingleFlight`: the first caller that sees a 401 starts the refresh,
//!   everyone arriving while it runs awaits the same outcome.
//! - `PerCall`: every 401 starts its own refresh. Two concurrent refreshes
//!   may race on a rotated refresh token; kept for backends that rely on it.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::types::RefreshResponse;
use crate::error::{CoreError, Result};
use crate::storage::SessionStore;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshMode {
    #[default]
    SingleFlight,
    PerCall,
}

impl FromStr for RefreshMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "single_flight" | "single-flight" => Ok(Self::SingleFlight),
            "per_call" | "per-call" => Ok(Self::PerCall),
            other => Err(format!("unknown refresh mode '{}'", other)),
        }
    }
}

type SharedRefresh = Shared<BoxFuture<'static, Result<String>>>;

/// Runs the refresh protocol and, in single-flight mode, deduplicates it.
pub struct RefreshCoordinator {
    mode: RefreshMode,
    in_flight: Arc<Mutex<Option<SharedRefresh>>>,
}

impl fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshCoordinator")
            .field("mode", &self.mode)
            .field("in_flight", &self.in_flight.lock().is_some())
            .finish()
    }
}

impl RefreshCoordinator {
    pub fn new(mode: RefreshMode) -> Self {
        Self {
            mode,
            in_flight: Arc::new(Mutex::new(None)),
        }
    }

    pub fn mode(&self) -> RefreshMode {
        self.mode
    }

    /// Obtain a new access token. Returns the token now stored in `session`.
    pub async fn refresh(
        &self,
        http: &reqwest::Client,
        refresh_url: String,
        session: &SessionStore,
    ) -> Result<String> {
        match self.mode {
            RefreshMode::PerCall => {
                refresh_tokens(http.clone(), refresh_url, session.clone()).await
            }
            RefreshMode::SingleFlight => self.join_or_start(http, refresh_url, session).await,
        }
    }

    fn join_or_start(
        &self,
        http: &reqwest::Client,
        refresh_url: String,
        session: &SessionStore,
    ) -> SharedRefresh {
        let mut slot = self.in_flight.lock();
        if let Some(existing) = slot.as_ref() {
            tracing::debug!("Joining in-flight token refresh");
            return existing.clone();
        }

        let in_flight = Arc::clone(&self.in_flight);
        let http = http.clone();
        let session = session.clone();
        let refresh = async move {
            let outcome = refresh_tokens(http, refresh_url, session).await;
            in_flight.lock().take();
            outcome
        }
        .boxed()
        .shared();

        *slot = Some(refresh.clone());
        refresh
    }
}

/// POST the refresh credential and store the returned pair.
///
/// A rejected refresh clears the whole session. A transport failure does
/// not: the credentials may still be good once the network is back.
async fn refresh_tokens(
    http: reqwest::Client,
    refresh_url: String,
    session: SessionStore,
) -> Result<String> {
    let Some(refresh_token) = session.refresh_token() else {
        return Err(CoreError::AuthFailure);
    };

    let response = http
        .post(&refresh_url)
        .json(&serde_json::json!({ "refresh": refresh_token }))
        .send()
        .await?;

    if !response.status().is_success() {
        tracing::warn!(
            status = response.status().as_u16(),
            "Token refresh rejected, clearing session"
        );
        if let Err(e) = session.logout() {
            tracing::error!(error = %e, "Failed to clear session after rejected refresh");
        }
        return Err(CoreError::AuthFailure);
    }

    let payload: RefreshResponse = response.json().await?;

    // A server that does not rotate omits the refresh token; keep ours.
    let refresh = payload
        .refresh
        .filter(|token| !token.is_empty())
        .unwrap_or(refresh_token);
    session.set_tokens(&payload.access, &refresh)?;

    tracing::info!("Refreshed access token");
    Ok(payload.access)
}
