//! Cross-context notification glue
//!
//! The background worker publishes on a [`PushBroadcaster`]; every open
//! foreground context holds a receiver and runs a [`ForegroundNotifier`]
//! that raises the unread flag and the badge. Delivery is fire-and-forget:
//! no acknowledgement, no ordering relative to the visible notification.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::constants::channels;
use crate::error::Result;
use crate::storage::SessionStore;

/// Message posted from the worker to foreground windows
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum WorkerMessage {
    PushReceived,
}

/// One publisher, many foreground subscribers
#[derive(Debug, Clone)]
pub struct PushBroadcaster {
    sender: broadcast::Sender<WorkerMessage>,
}

impl Default for PushBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl PushBroadcaster {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(channels::BROADCAST_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorkerMessage> {
        self.sender.subscribe()
    }

    /// Publish to every current subscriber. Returns how many received it.
    pub fn publish(&self, message: WorkerMessage) -> usize {
        match self.sender.send(message) {
            Ok(receivers) => receivers,
            Err(_) => {
                tracing::debug!("No foreground window listening for worker messages");
                0
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Foreground side: keeps the unread flag and a badge in step with pushes.
#[derive(Debug)]
pub struct ForegroundNotifier {
    session: SessionStore,
    badge: watch::Sender<bool>,
}

impl ForegroundNotifier {
    pub fn new(session: SessionStore) -> Self {
        let (badge, _) = watch::channel(session.has_unread_notifications());
        Self { session, badge }
    }

    /// Badge state for the UI
    pub fn badge(&self) -> watch::Receiver<bool> {
        self.badge.subscribe()
    }

    /// Read the flag from storage and bring the badge in line with it.
    ///
    /// A clear made by another window only shows up here on this read.
    pub fn has_unread(&self) -> bool {
        let unread = self.session.has_unread_notifications();
        self.badge.send_replace(unread);
        unread
    }

    /// The user opened the notification surface
    pub fn mark_read(&self) -> Result<()> {
        self.session.set_unread_notifications(false)?;
        self.badge.send_replace(false);
        Ok(())
    }

    pub fn handle_message(&self, message: &WorkerMessage) -> Result<()> {
        match message {
            WorkerMessage::PushReceived => {
                self.session.set_unread_notifications(true)?;
                self.badge.send_replace(true);
                tracing::debug!("Push received, unread indicator raised");
            }
        }
        Ok(())
    }

    /// Consume worker messages until the publisher goes away.
    pub fn listen(
        self: Arc<Self>,
        mut messages: broadcast::Receiver<WorkerMessage>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let message = match messages.recv().await {
                    Ok(message) => message,
                    // Only pushes are ever sent, so missed messages mean a push arrived
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "Foreground listener lagged");
                        WorkerMessage::PushReceived
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                if let Err(e) = self.handle_message(&message) {
                    tracing::warn!(error = %e, "Failed to record unread notification");
                }
            }
        })
    }
}
