//! Wire types for the account endpoints

use serde::{Deserialize, Serialize};

/// Body of POST /api/auth/login/
#[derive(Debug, Clone, Serialize)]
pub struct LoginCredentials {
    pub username: String,
    pub password: String,
}

/// Body of POST /api/auth/register/
#[derive(Debug, Clone, Serialize)]
pub struct RegisterData {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Profile as returned by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub is_moderator: bool,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// Login and registration response
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    pub access: String,
    pub refresh: String,
    pub user: UserProfile,
}

/// Response of GET /api/auth/me/ and PUT /api/auth/me/update/
#[derive(Debug, Clone, Deserialize)]
pub struct MeResponse {
    pub user: UserProfile,
}

/// Response of POST /api/auth/refresh/
///
/// `refresh` is optional: the server may or may not rotate it.
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshResponse {
    pub access: String,
    #[serde(default)]
    pub refresh: Option<String>,
}

/// An avatar image to upload with a profile update
#[derive(Debug, Clone)]
pub struct AvatarUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub mime: Option<String>,
}

/// Partial profile update; unset fields are left untouched server-side.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub remove_avatar: bool,
    /// Sent as multipart when present
    #[serde(skip)]
    pub avatar: Option<AvatarUpload>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.username.is_none()
            && self.email.is_none()
            && self.password.is_none()
            && !self.remove_avatar
            && self.avatar.is_none()
    }
}
