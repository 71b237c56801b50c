//! Capabilities the host platform provides for notifications.
//!
//! The presenter and the offline worker only talk to these traits, so the
//! host can plug in a desktop backend while tests use the in-memory fakes
//! at the bottom of this module.

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PermissionStatus {
    /// The user has not answered yet.
    Default,
    Granted,
    Denied,
}

impl PermissionStatus {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "default" | "unset" | "prompt" => Some(Self::Default),
            "granted" => Some(Self::Granted),
            "denied" => Some(Self::Denied),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PermissionError {
    #[error("permission prompt unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, thiserror::Error)]
pub enum DisplayError {
    #[error("notification backend rejected `{tag}`: {reason}")]
    Rejected { tag: String, reason: String },
    #[error("notification backend unavailable: {0}")]
    Unavailable(String),
}

/// What happens when the user clicks a notification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ClickAction {
    None,
    /// Bring the app window forward and route it to `path`.
    FocusAndNavigate { path: String },
    /// Close the notification and open (or focus) a window at `path`.
    CloseAndOpen { path: String },
}

impl ClickAction {
    pub async fn perform(&self, window: &dyn AppWindow) {
        match self {
            Self::None => {}
            Self::FocusAndNavigate { path } => {
                window.focus().await;
                window.navigate(path).await;
            }
            Self::CloseAndOpen { path } => window.open_window(path).await,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: Option<String>,
    /// Notifications sharing a tag replace each other.
    pub tag: Option<String>,
    pub on_click: ClickAction,
}

impl Notification {
    pub fn new(title: impl Into<String>, body: impl Into<String>, icon: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            icon: icon.into(),
            badge: None,
            tag: None,
            on_click: ClickAction::None,
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn with_badge(mut self, badge: impl Into<String>) -> Self {
        self.badge = Some(badge.into());
        self
    }

    pub fn on_click(mut self, action: ClickAction) -> Self {
        self.on_click = action;
        self
    }
}

#[async_trait]
pub trait PermissionApi: Send + Sync {
    async fn status(&self) -> PermissionStatus;

    /// Prompts the user. Dismissing the prompt resolves to `Default`.
    async fn request(&self) -> Result<PermissionStatus, PermissionError>;
}

#[async_trait]
pub trait NotificationDisplay: Send + Sync {
    async fn show(&self, notification: Notification) -> Result<(), DisplayError>;

    async fn close(&self, tag: &str) -> Result<(), DisplayError>;
}

#[async_trait]
pub trait AppWindow: Send + Sync {
    async fn focus(&self);

    async fn navigate(&self, path: &str);

    async fn open_window(&self, path: &str);
}

/// Permission source with a fixed answer to every prompt.
#[derive(Debug)]
pub struct StaticPermission {
    status: RwLock<PermissionStatus>,
    answer: PermissionStatus,
    requests: Mutex<usize>,
}

impl StaticPermission {
    pub fn new(status: PermissionStatus) -> Self {
        Self::prompting(status, status)
    }

    /// Starts at `status`; a prompt resolves to `answer`.
    pub fn prompting(status: PermissionStatus, answer: PermissionStatus) -> Self {
        Self {
            status: RwLock::new(status),
            answer,
            requests: Mutex::new(0),
        }
    }

    pub fn request_count(&self) -> usize {
        *self.requests.lock()
    }
}

#[async_trait]
impl PermissionApi for StaticPermission {
    async fn status(&self) -> PermissionStatus {
        *self.status.read()
    }

    async fn request(&self) -> Result<PermissionStatus, PermissionError> {
        *self.requests.lock() += 1;
        let mut status = self.status.write();
        if *status == PermissionStatus::Default {
            *status = self.answer;
        }
        Ok(*status)
    }
}

/// Keeps visible notifications in memory, keyed by tag.
#[derive(Debug, Default)]
pub struct MemoryDisplay {
    visible: RwLock<BTreeMap<String, Notification>>,
    shown: Mutex<usize>,
    untagged: Mutex<usize>,
}

impl MemoryDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn visible(&self) -> Vec<Notification> {
        self.visible.read().values().cloned().collect()
    }

    pub fn get(&self, tag: &str) -> Option<Notification> {
        self.visible.read().get(tag).cloned()
    }

    /// Total `show` calls, including replacements.
    pub fn shown_count(&self) -> usize {
        *self.shown.lock()
    }

    /// Simulates a click: the notification stays visible and its action is returned.
    pub fn click(&self, tag: &str) -> Option<ClickAction> {
        self.visible
            .read()
            .get(tag)
            .map(|notification| notification.on_click.clone())
    }
}

#[async_trait]
impl NotificationDisplay for MemoryDisplay {
    async fn show(&self, notification: Notification) -> Result<(), DisplayError> {
        *self.shown.lock() += 1;
        let tag = match &notification.tag {
            Some(tag) => tag.clone(),
            None => {
                let mut counter = self.untagged.lock();
                *counter += 1;
                format!("untagged-{}", *counter)
            }
        };
        debug!(%tag, title = %notification.title, "notification shown");
        self.visible.write().insert(tag, notification);
        Ok(())
    }

    async fn close(&self, tag: &str) -> Result<(), DisplayError> {
        self.visible.write().remove(tag);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WindowCall {
    Focus,
    Navigate(String),
    OpenWindow(String),
}

/// Window stand-in that records every call made on it.
#[derive(Debug, Default)]
pub struct RecordingWindow {
    calls: Mutex<Vec<WindowCall>>,
}

impl RecordingWindow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<WindowCall> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl AppWindow for RecordingWindow {
    async fn focus(&self) {
        self.calls.lock().push(WindowCall::Focus);
    }

    async fn navigate(&self, path: &str) {
        self.calls.lock().push(WindowCall::Navigate(path.to_string()));
    }

    async fn open_window(&self, path: &str) {
        self.calls.lock().push(WindowCall::OpenWindow(path.to_string()));
    }
}
