use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::platform::PermissionStatus;
use crate::presenter::Presenter;
use crate::scheduler::{Clock, ReminderKey, ReminderScheduler};
use crate::task::TasksUpdated;

#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("malformed tasksUpdated payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Page-side entry point: owns the scheduler and reacts to `tasksUpdated`.
pub struct NotificationRuntime {
    scheduler: ReminderScheduler,
}

/// Called once by the host at startup. Asks for notification permission up
/// front when the user has not decided yet.
pub async fn initialize(presenter: Arc<Presenter>, clock: Arc<dyn Clock>) -> NotificationRuntime {
    if presenter.supports_notifications() {
        let permission = presenter.permission();
        if permission.status().await == PermissionStatus::Default {
            match permission.request().await {
                Ok(status) => info!(?status, "notification permission resolved"),
                Err(err) => warn!(%err, "notification permission request failed"),
            }
        }
    }
    NotificationRuntime {
        scheduler: ReminderScheduler::new(presenter, clock),
    }
}

impl NotificationRuntime {
    /// Runs a scheduling pass when the event carries `detail.tasks`.
    /// Returns whether a pass ran.
    pub fn handle_event(&self, event: &TasksUpdated) -> bool {
        let Some(tasks) = event.tasks() else {
            debug!("tasksUpdated without tasks, ignoring");
            return false;
        };
        self.scheduler.schedule_reminders(tasks);
        true
    }

    pub fn handle_event_json(&self, raw: &str) -> Result<bool, EventError> {
        let event = TasksUpdated::from_json(raw)?;
        Ok(self.handle_event(&event))
    }

    pub fn scheduler(&self) -> &ReminderScheduler {
        &self.scheduler
    }

    pub fn armed(&self) -> Vec<ReminderKey> {
        self.scheduler.armed()
    }
}
