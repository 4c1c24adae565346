//! Authentication for the RAI backend
//!
//! - [`AuthenticatedClient`] attaches the bearer credential and runs the
//!   refresh-and-retry-once protocol on 401.
//! - [`RefreshCoordinator`] decides whether concurrent 401s share a refresh.
//! - [`AuthService`] covers the account endpoints (login, register, profile).

mod client;
mod refresh;
mod request;
mod service;
mod types;

pub use client::AuthenticatedClient;
pub use refresh::{RefreshCoordinator, RefreshMode};
pub use request::{MultipartField, RequestBody, RequestOptions};
pub use service::{AuthService, CachedProfile};
pub use types::{
    AuthResponse, AvatarUpload, LoginCredentials, MeResponse, ProfileUpdate, RefreshResponse,
    RegisterData, UserProfile,
};
