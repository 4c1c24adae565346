//! In-process host for the background worker: a notification tray and a
//! set of open windows.

use async_trait::async_trait;
use parking_lot::Mutex;

use super::host::{
    DisplayedNotification, NotificationOptions, NotificationSurface, WindowClient, WindowClients,
};
use crate::error::{CoreError, Result};

#[derive(Debug, Default)]
struct HostState {
    notifications: Vec<DisplayedNotification>,
    windows: Vec<WindowClient>,
    focused: Vec<String>,
    opened: Vec<String>,
    claimed: bool,
    next_id: u64,
}

impl HostState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Debug)]
pub struct SimulatedHost {
    navigation: bool,
    open_window: bool,
    state: Mutex<HostState>,
}

impl Default for SimulatedHost {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedHost {
    pub fn new() -> Self {
        Self {
            navigation: true,
            open_window: true,
            state: Mutex::new(HostState::default()),
        }
    }

    /// Host whose windows cannot be navigated in place
    pub fn without_navigation(mut self) -> Self {
        self.navigation = false;
        self
    }

    pub fn without_open_window(mut self) -> Self {
        self.open_window = false;
        self
    }

    /// Add an open window and return its id
    pub fn add_window(&self, url: &str, focusable: bool, controlled: bool) -> String {
        let mut state = self.state.lock();
        let id = format!("window-{}", state.next_id());
        state.windows.push(WindowClient {
            id: id.clone(),
            url: url.to_string(),
            focusable,
            controlled,
        });
        id
    }

    /// Notifications currently visible
    pub fn notifications(&self) -> Vec<DisplayedNotification> {
        self.state.lock().notifications.clone()
    }

    pub fn windows(&self) -> Vec<WindowClient> {
        self.state.lock().windows.clone()
    }

    pub fn window_url(&self, id: &str) -> Option<String> {
        self.state
            .lock()
            .windows
            .iter()
            .find(|w| w.id == id)
            .map(|w| w.url.clone())
    }

    /// Window ids in the order they were focused
    pub fn focused(&self) -> Vec<String> {
        self.state.lock().focused.clone()
    }

    /// URLs of windows opened by the worker
    pub fn opened(&self) -> Vec<String> {
        self.state.lock().opened.clone()
    }

    pub fn is_claimed(&self) -> bool {
        self.state.lock().claimed
    }
}

#[async_trait]
impl NotificationSurface for SimulatedHost {
    async fn show_notification(
        &self,
        title: &str,
        options: NotificationOptions,
    ) -> Result<DisplayedNotification> {
        let mut state = self.state.lock();
        state
            .notifications
            .retain(|shown| shown.options.tag != options.tag);
        let displayed = DisplayedNotification {
            id: state.next_id(),
            title: title.to_string(),
            options,
        };
        state.notifications.push(displayed.clone());
        Ok(displayed)
    }

    async fn close_notification(&self, id: u64) -> Result<()> {
        self.state.lock().notifications.retain(|shown| shown.id != id);
        Ok(())
    }
}

#[async_trait]
impl WindowClients for SimulatedHost {
    async fn match_all(&self, include_uncontrolled: bool) -> Result<Vec<WindowClient>> {
        Ok(self
            .state
            .lock()
            .windows
            .iter()
            .filter(|w| include_uncontrolled || w.controlled)
            .cloned()
            .collect())
    }

    async fn claim(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.claimed = true;
        for window in &mut state.windows {
            window.controlled = true;
        }
        Ok(())
    }

    async fn navigate(&self, client_id: &str, url: &str) -> Result<()> {
        if !self.navigation {
            return Err(CoreError::EnvironmentUnsupported(
                "In-place navigation is not supported".to_string(),
            ));
        }
        let mut state = self.state.lock();
        let window = state
            .windows
            .iter_mut()
            .find(|w| w.id == client_id)
            .ok_or_else(|| CoreError::InvalidRequest(format!("no window {}", client_id)))?;
        window.url = url.to_string();
        Ok(())
    }

    async fn focus(&self, client_id: &str) -> Result<()> {
        let mut state = self.state.lock();
        if !state.windows.iter().any(|w| w.id == client_id) {
            return Err(CoreError::InvalidRequest(format!("no window {}", client_id)));
        }
        state.focused.push(client_id.to_string());
        Ok(())
    }

    fn can_open_window(&self) -> bool {
        self.open_window
    }

    async fn open_window(&self, url: &str) -> Result<String> {
        let mut state = self.state.lock();
        let id = format!("window-{}", state.next_id());
        state.windows.push(WindowClient {
            id: id.clone(),
            url: url.to_string(),
            focusable: true,
            controlled: true,
        });
        state.opened.push(url.to_string());
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(tag: &str) -> NotificationOptions {
        NotificationOptions {
            body: "b".into(),
            tag: tag.into(),
            icon: "/vite.svg".into(),
            badge: "/vite.svg".into(),
            data: crate::worker::NotificationData { url: "/".into() },
        }
    }

    #[tokio::test]
    async fn same_tag_replaces_other_tags_stack() {
        let host = SimulatedHost::new();
        host.show_notification("a", options("rai-push")).await.unwrap();
        host.show_notification("b", options("other")).await.unwrap();
        host.show_notification("c", options("rai-push")).await.unwrap();

        let titles: Vec<String> = host.notifications().into_iter().map(|n| n.title).collect();
        assert_eq!(titles, vec!["b".to_string(), "c".to_string()]);
    }

    #[tokio::test]
    async fn claim_takes_control_of_every_window() {
        let host = SimulatedHost::new();
        host.add_window("/", true, false);
        assert!(host.match_all(false).await.unwrap().is_empty());

        host.claim().await.unwrap();
        assert_eq!(host.match_all(false).await.unwrap().len(), 1);
        assert!(host.is_claimed());
    }
}
