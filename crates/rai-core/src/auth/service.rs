//! Account operations: login, registration, profile

use reqwest::Response;
use serde::de::DeserializeOwned;

use super::client::AuthenticatedClient;
use super::request::{MultipartField, RequestOptions};
use super::types::{
    AuthResponse, LoginCredentials, MeResponse, ProfileUpdate, RegisterData, UserProfile,
};
use crate::constants::api;
use crate::error::{rejection, CoreError, Result};
use crate::storage::SessionStore;

/// Profile fields as cached in the session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CachedProfile {
    pub username: Option<String>,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
    pub is_moderator: bool,
}

impl CachedProfile {
    fn from_session(session: &SessionStore) -> Self {
        Self {
            username: session.username(),
            email: session.email(),
            avatar_url: session.avatar_url().filter(|url| !url.is_empty()),
            is_moderator: session.is_moderator(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuthService {
    client: AuthenticatedClient,
}

impl AuthService {
    pub fn new(client: AuthenticatedClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &AuthenticatedClient {
        &self.client
    }

    fn session(&self) -> &SessionStore {
        self.client.session()
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<UserProfile> {
        let credentials = LoginCredentials {
            username: username.to_string(),
            password: password.to_string(),
        };
        let response = self
            .client
            .fetch_public(api::LOGIN, RequestOptions::post().json(&credentials)?)
            .await?;
        let auth: AuthResponse = decode(response, "Invalid credentials").await?;
        self.store_auth(&auth)?;

        tracing::info!(username = %auth.user.username, "Signed in");
        Ok(auth.user)
    }

    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<UserProfile> {
        let data = RegisterData {
            username: username.to_string(),
            email: email.to_string(),
            password: password.to_string(),
        };
        let response = self
            .client
            .fetch_public(api::REGISTER, RequestOptions::post().json(&data)?)
            .await?;
        let auth: AuthResponse = decode(response, "Registration failed").await?;
        self.store_auth(&auth)?;

        tracing::info!(username = %auth.user.username, "Registered account");
        Ok(auth.user)
    }

    /// GET the profile of the signed-in user. Does not touch the cache.
    pub async fn fetch_current_user(&self) -> Result<UserProfile> {
        let response = self.client.fetch(api::ME, RequestOptions::get()).await?;
        let me: MeResponse = decode(response, "Failed to fetch current user").await?;
        Ok(me.user)
    }

    /// Refresh the cached profile from the server.
    ///
    /// Any failure other than an expired session leaves the cache as it was
    /// and returns the cached values, so a flaky network does not demote a
    /// moderator in the UI.
    pub async fn sync_profile(&self) -> Result<CachedProfile> {
        if !self.is_authenticated() {
            return Ok(CachedProfile::from_session(self.session()));
        }

        match self.fetch_current_user().await {
            Ok(user) => {
                self.store_profile(&user)?;
                Ok(CachedProfile::from_session(self.session()))
            }
            Err(CoreError::AuthFailure) => Err(CoreError::AuthFailure),
            Err(e) => {
                tracing::warn!(error = %e, "Profile sync failed, keeping cached profile");
                Ok(CachedProfile::from_session(self.session()))
            }
        }
    }

    /// PUT a partial update. Sent as multipart when an avatar is attached.
    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<UserProfile> {
        if update.is_empty() {
            return Err(CoreError::InvalidRequest("Nothing to update".to_string()));
        }

        let options = match &update.avatar {
            Some(avatar) => {
                let mut fields = Vec::new();
                let text_fields = [
                    ("username", update.username.as_ref()),
                    ("email", update.email.as_ref()),
                    ("password", update.password.as_ref()),
                ];
                for (name, value) in text_fields {
                    if let Some(value) = value {
                        fields.push(MultipartField::Text {
                            name: name.to_string(),
                            value: value.clone(),
                        });
                    }
                }
                if update.remove_avatar {
                    fields.push(MultipartField::Text {
                        name: "remove_avatar".to_string(),
                        value: "true".to_string(),
                    });
                }
                fields.push(MultipartField::File {
                    name: "avatar".to_string(),
                    file_name: avatar.file_name.clone(),
                    bytes: avatar.bytes.clone(),
                    mime: avatar.mime.clone(),
                });
                RequestOptions::put().multipart(fields)
            }
            None => RequestOptions::put().json(update)?,
        };

        let response = self.client.fetch(api::ME_UPDATE, options).await?;
        let me: MeResponse = decode(response, "Profile update failed").await?;
        self.store_profile(&me.user)?;

        tracing::info!(username = %me.user.username, "Profile updated");
        Ok(me.user)
    }

    pub fn logout(&self) -> Result<()> {
        self.session().logout()
    }

    pub fn is_authenticated(&self) -> bool {
        self.session().is_authenticated()
    }

    pub fn cached_profile(&self) -> CachedProfile {
        CachedProfile::from_session(self.session())
    }

    fn store_auth(&self, auth: &AuthResponse) -> Result<()> {
        self.session().set_tokens(&auth.access, &auth.refresh)?;
        self.store_profile(&auth.user)
    }

    fn store_profile(&self, user: &UserProfile) -> Result<()> {
        let session = self.session();
        session.set_username(&user.username)?;
        session.set_email(&user.email)?;
        session.set_avatar_url(user.avatar_url.as_deref().unwrap_or_default())?;
        session.set_is_moderator(user.is_moderator)
    }
}

/// Decode a success body, or turn a failure into a server rejection.
async fn decode<T: DeserializeOwned>(response: Response, fallback: &str) -> Result<T> {
    if !response.status().is_success() {
        return Err(rejection(response, fallback).await);
    }
    Ok(response.json().await?)
}
