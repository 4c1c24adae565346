//! Background worker runtime
//!
//! The worker is a task that owns its state and receives lifecycle events
//! over a channel. Each event carries a completion sender, so a caller can
//! wait until the handler (and everything it started) has finished.
//!
//! ```text
//! Unregistered --install--> Installed --activate--> Active
//!                                ^                     |
//!                                +------install--------+   (new version)
//! ```
//!
//! Install skips waiting and activates straight away. Handler failures are
//! logged and swallowed; they never stop the loop.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use super::host::{
    DisplayedNotification, NotificationData, NotificationOptions, NotificationSurface,
    WindowClients,
};
use crate::constants::notification;
use crate::error::{CoreError, Result};
use crate::notifier::{PushBroadcaster, WorkerMessage};
use crate::push::NotificationPayload;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Unregistered,
    Installed,
    Active,
}

#[derive(Debug, Clone)]
pub enum WorkerEvent {
    Install,
    Activate,
    /// Raw push body, if the delivery carried one
    Push(Option<Vec<u8>>),
    NotificationClick(DisplayedNotification),
}

impl WorkerEvent {
    fn name(&self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Activate => "activate",
            Self::Push(_) => "push",
            Self::NotificationClick(_) => "notificationclick",
        }
    }
}

struct Envelope {
    event: WorkerEvent,
    done: oneshot::Sender<()>,
}

/// Cloneable handle for dispatching events to a running worker
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    events: mpsc::UnboundedSender<Envelope>,
    state: watch::Receiver<WorkerState>,
}

impl WorkerHandle {
    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    /// State updates, for hosts that want to observe the lifecycle
    pub fn state_changes(&self) -> watch::Receiver<WorkerState> {
        self.state.clone()
    }

    pub async fn install(&self) -> Result<()> {
        self.dispatch(WorkerEvent::Install).await
    }

    pub async fn activate(&self) -> Result<()> {
        self.dispatch(WorkerEvent::Activate).await
    }

    pub async fn push(&self, data: Option<Vec<u8>>) -> Result<()> {
        self.dispatch(WorkerEvent::Push(data)).await
    }

    pub async fn notification_click(&self, notification: DisplayedNotification) -> Result<()> {
        self.dispatch(WorkerEvent::NotificationClick(notification)).await
    }

    /// Send an event and wait for its handler to finish.
    pub async fn dispatch(&self, event: WorkerEvent) -> Result<()> {
        let (done, finished) = oneshot::channel();
        self.events
            .send(Envelope { event, done })
            .map_err(|_| CoreError::WorkerStopped)?;
        finished.await.map_err(|_| CoreError::WorkerStopped)
    }
}

pub struct BackgroundWorkerRuntime {
    state: watch::Sender<WorkerState>,
    notifications: Arc<dyn NotificationSurface>,
    clients: Arc<dyn WindowClients>,
    broadcaster: PushBroadcaster,
    events: mpsc::UnboundedReceiver<Envelope>,
}

impl BackgroundWorkerRuntime {
    /// Start the worker loop. It stops once every handle is dropped.
    pub fn spawn(
        notifications: Arc<dyn NotificationSurface>,
        clients: Arc<dyn WindowClients>,
        broadcaster: PushBroadcaster,
    ) -> (WorkerHandle, JoinHandle<()>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(WorkerState::Unregistered);

        let runtime = Self {
            state: state_tx,
            notifications,
            clients,
            broadcaster,
            events: events_rx,
        };
        let task = tokio::spawn(runtime.run());

        (
            WorkerHandle {
                events: events_tx,
                state: state_rx,
            },
            task,
        )
    }

    async fn run(mut self) {
        while let Some(Envelope { event, done }) = self.events.recv().await {
            let name = event.name();
            self.handle(event).await;
            tracing::trace!(event = name, "Worker event handled");
            let _ = done.send(());
        }
        tracing::debug!("Background worker stopped");
    }

    fn current(&self) -> WorkerState {
        *self.state.borrow()
    }

    async fn handle(&self, event: WorkerEvent) {
        if self.current() == WorkerState::Unregistered && !matches!(event, WorkerEvent::Install) {
            tracing::debug!(event = event.name(), "Worker not installed, dropping event");
            return;
        }

        match event {
            WorkerEvent::Install => self.on_install().await,
            WorkerEvent::Activate => self.on_activate().await,
            WorkerEvent::Push(data) => self.on_push(data.as_deref()).await,
            WorkerEvent::NotificationClick(notification) => {
                self.on_notification_click(notification).await
            }
        }
    }

    async fn on_install(&self) {
        self.state.send_replace(WorkerState::Installed);
        tracing::info!("Background worker installed");
        // Skip waiting: no cache to hand over between versions
        self.on_activate().await;
    }

    async fn on_activate(&self) {
        if self.current() != WorkerState::Installed {
            return;
        }
        if let Err(e) = self.clients.claim().await {
            tracing::warn!(error = %e, "Failed to claim open windows");
        }
        self.state.send_replace(WorkerState::Active);
        tracing::info!("Background worker active");
    }

    async fn on_push(&self, data: Option<&[u8]>) {
        let payload = NotificationPayload::from_push_data(data);

        let listeners = self.broadcaster.publish(WorkerMessage::PushReceived);
        tracing::debug!(listeners, "Announced push to open windows");

        let options = NotificationOptions {
            body: payload.body.clone(),
            tag: notification::TAG.to_string(),
            icon: notification::ICON.to_string(),
            badge: notification::BADGE.to_string(),
            data: NotificationData {
                url: payload.target_url().to_string(),
            },
        };
        if let Err(e) = self
            .notifications
            .show_notification(&payload.title, options)
            .await
        {
            tracing::warn!(error = %e, "Failed to show push notification");
        }
    }

    async fn on_notification_click(&self, clicked: DisplayedNotification) {
        if let Err(e) = self.notifications.close_notification(clicked.id).await {
            tracing::debug!(error = %e, "Failed to close clicked notification");
        }

        let target = if clicked.options.data.url.is_empty() {
            notification::DEFAULT_URL
        } else {
            clicked.options.data.url.as_str()
        };

        let windows = match self.clients.match_all(true).await {
            Ok(windows) => windows,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to list open windows");
                Vec::new()
            }
        };

        if let Some(window) = windows.iter().find(|w| w.focusable) {
            if let Err(e) = self.clients.navigate(&window.id, target).await {
                tracing::debug!(
                    error = %e,
                    window = %window.id,
                    "In-place navigation failed, focusing only"
                );
            }
            if let Err(e) = self.clients.focus(&window.id).await {
                tracing::warn!(error = %e, window = %window.id, "Failed to focus window");
            }
            return;
        }

        if self.clients.can_open_window() {
            if let Err(e) = self.clients.open_window(target).await {
                tracing::warn!(error = %e, url = target, "Failed to open window");
            }
        }
    }
}
