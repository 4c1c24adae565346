//! Persistence layer
//!
//! Origin-scoped key/value storage for:
//! - Access and refresh credentials
//! - Cached profile fields
//! - The unread-notification flag

mod backend;
mod session;

pub use backend::{FileBackend, MemoryBackend, SessionBackend};
pub use session::{Session, SessionChange, SessionKey, SessionStore};
