//! Terminal stand-ins for the notification display and worker clients.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use taskminder_notify::platform::{DisplayError, Notification, NotificationDisplay};
use taskminder_offline::Clients;
use tracing::info;

/// Writes notifications to the log. Tagged notifications replace earlier
/// ones with the same tag, mirroring desktop notification centres.
#[derive(Debug, Default)]
pub struct ConsoleDisplay {
    visible: Mutex<HashMap<String, Notification>>,
}

impl ConsoleDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn visible_count(&self) -> usize {
        self.visible.lock().len()
    }
}

#[async_trait]
impl NotificationDisplay for ConsoleDisplay {
    async fn show(&self, notification: Notification) -> Result<(), DisplayError> {
        let replaced = match &notification.tag {
            Some(tag) => self
                .visible
                .lock()
                .insert(tag.clone(), notification.clone())
                .is_some(),
            None => false,
        };
        info!(
            title = %notification.title,
            body = %notification.body,
            tag = notification.tag.as_deref().unwrap_or("-"),
            replaced,
            "notification"
        );
        Ok(())
    }

    async fn close(&self, tag: &str) -> Result<(), DisplayError> {
        self.visible.lock().remove(tag);
        Ok(())
    }
}

/// Client host for the offline worker when running outside a browser.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleClients;

#[async_trait]
impl Clients for ConsoleClients {
    async fn claim(&self) {
        info!("claiming open pages");
    }

    async fn open_window(&self, path: &str) {
        info!(%path, "open app window");
    }
}
