//! Session store
//!
//! Single source of truth for the credential pair and the cached profile.
//! The store is a cheap cloneable handle; every component that needs the
//! session gets a clone injected. Writers do not coordinate: each write is
//! a snapshot of server-confirmed state, so the last one wins.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::broadcast;

use super::backend::{FileBackend, MemoryBackend, SessionBackend};
use crate::constants::channels;
use crate::error::Result;

/// One persisted session field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionKey {
    AccessToken,
    RefreshToken,
    Username,
    Email,
    AvatarUrl,
    IsModerator,
    HasUnreadNotifications,
}

impl SessionKey {
    pub const ALL: [SessionKey; 7] = [
        SessionKey::AccessToken,
        SessionKey::RefreshToken,
        SessionKey::Username,
        SessionKey::Email,
        SessionKey::AvatarUrl,
        SessionKey::IsModerator,
        SessionKey::HasUnreadNotifications,
    ];

    /// Key under which the field is persisted
    pub fn storage_key(&self) -> &'static str {
        match self {
            SessionKey::AccessToken => "accessToken",
            SessionKey::RefreshToken => "refreshToken",
            SessionKey::Username => "username",
            SessionKey::Email => "email",
            SessionKey::AvatarUrl => "avatarUrl",
            SessionKey::IsModerator => "isModerator",
            SessionKey::HasUnreadNotifications => "hasUnreadNotifications",
        }
    }
}

/// Change notification published after every write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionChange {
    Set(SessionKey),
    Cleared(SessionKey),
    LoggedOut,
}

/// Point-in-time copy of every session field
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub username: Option<String>,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
    pub is_moderator: bool,
    pub has_unread_notifications: bool,
}

impl Session {
    /// No access credential means unauthenticated, whatever else is cached.
    pub fn is_authenticated(&self) -> bool {
        self.access_token.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct SessionStore {
    backend: Arc<dyn SessionBackend>,
    changes: broadcast::Sender<SessionChange>,
}

impl SessionStore {
    pub fn with_backend(backend: Arc<dyn SessionBackend>) -> Self {
        let (changes, _) = broadcast::channel(channels::SESSION_CHANGES_CAPACITY);
        Self { backend, changes }
    }

    /// Store that lives only as long as the process
    pub fn in_memory() -> Self {
        Self::with_backend(Arc::new(MemoryBackend::new()))
    }

    /// Store persisted as JSON at `path`
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self::with_backend(Arc::new(FileBackend::new(path)))
    }

    /// Subscribe to writes made through this handle and its clones.
    pub fn subscribe_changes(&self) -> broadcast::Receiver<SessionChange> {
        self.changes.subscribe()
    }

    /// Read one field. Unreadable storage reads as absent.
    pub fn get(&self, key: SessionKey) -> Option<String> {
        match self.backend.get(key.storage_key()) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(key = key.storage_key(), error = %e, "Failed to read session field");
                None
            }
        }
    }

    pub fn set(&self, key: SessionKey, value: &str) -> Result<()> {
        self.backend.set(key.storage_key(), value)?;
        let _ = self.changes.send(SessionChange::Set(key));
        Ok(())
    }

    pub fn clear(&self, key: SessionKey) -> Result<()> {
        self.backend.remove(key.storage_key())?;
        let _ = self.changes.send(SessionChange::Cleared(key));
        Ok(())
    }

    /// Remove every field, unread flag included.
    pub fn logout(&self) -> Result<()> {
        let keys: Vec<&str> = SessionKey::ALL.iter().map(|k| k.storage_key()).collect();
        self.backend.remove_all(&keys)?;
        let _ = self.changes.send(SessionChange::LoggedOut);
        tracing::info!("Session cleared");
        Ok(())
    }

    pub fn access_token(&self) -> Option<String> {
        self.get(SessionKey::AccessToken)
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.get(SessionKey::RefreshToken)
    }

    pub fn set_tokens(&self, access_token: &str, refresh_token: &str) -> Result<()> {
        self.set(SessionKey::AccessToken, access_token)?;
        self.set(SessionKey::RefreshToken, refresh_token)
    }

    pub fn username(&self) -> Option<String> {
        self.get(SessionKey::Username)
    }

    pub fn set_username(&self, username: &str) -> Result<()> {
        self.set(SessionKey::Username, username)
    }

    pub fn email(&self) -> Option<String> {
        self.get(SessionKey::Email)
    }

    pub fn set_email(&self, email: &str) -> Result<()> {
        self.set(SessionKey::Email, email)
    }

    pub fn avatar_url(&self) -> Option<String> {
        self.get(SessionKey::AvatarUrl)
    }

    pub fn set_avatar_url(&self, avatar_url: &str) -> Result<()> {
        self.set(SessionKey::AvatarUrl, avatar_url)
    }

    pub fn is_moderator(&self) -> bool {
        self.get_flag(SessionKey::IsModerator)
    }

    pub fn set_is_moderator(&self, is_moderator: bool) -> Result<()> {
        self.set_flag(SessionKey::IsModerator, is_moderator)
    }

    pub fn has_unread_notifications(&self) -> bool {
        self.get_flag(SessionKey::HasUnreadNotifications)
    }

    pub fn set_unread_notifications(&self, unread: bool) -> Result<()> {
        self.set_flag(SessionKey::HasUnreadNotifications, unread)
    }

    pub fn is_authenticated(&self) -> bool {
        self.access_token().is_some()
    }

    pub fn snapshot(&self) -> Session {
        Session {
            access_token: self.access_token(),
            refresh_token: self.refresh_token(),
            username: self.username(),
            email: self.email(),
            avatar_url: self.avatar_url(),
            is_moderator: self.is_moderator(),
            has_unread_notifications: self.has_unread_notifications(),
        }
    }

    // Flags are persisted as "true" / "false"
    fn get_flag(&self, key: SessionKey) -> bool {
        self.get(key).as_deref() == Some("true")
    }

    fn set_flag(&self, key: SessionKey, value: bool) -> Result<()> {
        self.set(key, if value { "true" } else { "false" })
    }
}
