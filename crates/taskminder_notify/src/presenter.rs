use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::platform::{
    ClickAction, Notification, NotificationDisplay, PermissionApi, PermissionStatus,
};
use crate::task::TaskId;

pub const NOTIFICATION_ICON: &str = "/static/icons/icon-192x192.png";

/// Turns reminders into platform notifications, asking for permission when
/// the user has not decided yet.
pub struct Presenter {
    permission: Arc<dyn PermissionApi>,
    display: Option<Arc<dyn NotificationDisplay>>,
}

impl Presenter {
    pub fn new(permission: Arc<dyn PermissionApi>, display: Arc<dyn NotificationDisplay>) -> Self {
        Self {
            permission,
            display: Some(display),
        }
    }

    /// Presenter for a platform without any notification support.
    pub fn unsupported(permission: Arc<dyn PermissionApi>) -> Self {
        Self {
            permission,
            display: None,
        }
    }

    pub fn supports_notifications(&self) -> bool {
        self.display.is_some()
    }

    pub fn permission(&self) -> &dyn PermissionApi {
        self.permission.as_ref()
    }

    pub fn notification_for(title: &str, body: &str, task_id: &TaskId) -> Notification {
        Notification::new(title, body, NOTIFICATION_ICON)
            .with_tag(format!("task-{task_id}"))
            .on_click(ClickAction::FocusAndNavigate {
                path: format!("/?task={task_id}"),
            })
    }

    #[instrument(skip(self, body), fields(task = %task_id))]
    pub async fn present(&self, title: &str, body: &str, task_id: &TaskId) {
        let Some(display) = &self.display else {
            info!("this platform does not support notifications");
            return;
        };

        match self.permission.status().await {
            PermissionStatus::Granted => {}
            PermissionStatus::Denied => {
                debug!("notification permission denied, skipping");
                return;
            }
            PermissionStatus::Default => match self.permission.request().await {
                Ok(PermissionStatus::Granted) => {}
                Ok(status) => {
                    debug!(?status, "permission not granted after prompt");
                    return;
                }
                Err(err) => {
                    warn!(%err, "permission request failed");
                    return;
                }
            },
        }

        let notification = Self::notification_for(title, body, task_id);
        if let Err(err) = display.show(notification).await {
            warn!(%err, "unable to display notification");
        }
    }
}
