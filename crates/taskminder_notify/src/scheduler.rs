use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, instrument};

use crate::presenter::Presenter;
use crate::task::{Task, TaskId};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug)]
pub struct FixedClock {
    now: RwLock<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: RwLock::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.write() = now;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ReminderKind {
    DayBefore,
    HourBefore,
    DueNow,
}

impl ReminderKind {
    pub const ALL: [ReminderKind; 3] = [Self::DayBefore, Self::HourBefore, Self::DueNow];

    /// How long before the deadline this reminder fires.
    pub fn lead_time(self) -> chrono::Duration {
        match self {
            Self::DayBefore => chrono::Duration::hours(24),
            Self::HourBefore => chrono::Duration::hours(1),
            Self::DueNow => chrono::Duration::zero(),
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::DayBefore => "Task Due Soon",
            Self::HourBefore => "Task Due Very Soon",
            Self::DueNow => "Task Deadline Reached",
        }
    }

    pub fn body(self, task_title: &str) -> String {
        match self {
            Self::DayBefore => format!("Your task \"{task_title}\" is due in 24 hours."),
            Self::HourBefore => format!("Your task \"{task_title}\" is due in 1 hour."),
            Self::DueNow => format!("Your task \"{task_title}\" is now due!"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReminderKey {
    pub task_id: TaskId,
    pub kind: ReminderKind,
}

/// Everything a timer needs when it fires, captured at planning time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedReminder {
    pub task_id: TaskId,
    pub kind: ReminderKind,
    pub title: String,
    pub body: String,
    pub delay: Duration,
}

impl PlannedReminder {
    pub fn key(&self) -> ReminderKey {
        ReminderKey {
            task_id: self.task_id.clone(),
            kind: self.kind,
        }
    }
}

/// Reminders to arm for `task`, ordered by delay.
pub fn plan_reminders(task: &Task, now: DateTime<Utc>) -> Vec<PlannedReminder> {
    let remaining = task.deadline.signed_duration_since(now);
    ReminderKind::ALL
        .into_iter()
        .filter_map(|kind| {
            let lead = kind.lead_time();
            if remaining <= lead {
                return None;
            }
            let delay = (remaining - lead).to_std().ok()?;
            Some(PlannedReminder {
                task_id: task.id.clone(),
                kind,
                title: kind.title().to_string(),
                body: kind.body(&task.title),
                delay,
            })
        })
        .collect()
}

/// Owns one timer per (task, kind). Scheduling a task again cancels the
/// timers armed for it previously.
pub struct ReminderScheduler {
    presenter: Arc<Presenter>,
    clock: Arc<dyn Clock>,
    armed: Mutex<HashMap<ReminderKey, JoinHandle<()>>>,
}

impl ReminderScheduler {
    pub fn new(presenter: Arc<Presenter>, clock: Arc<dyn Clock>) -> Self {
        Self {
            presenter,
            clock,
            armed: Mutex::new(HashMap::new()),
        }
    }

    pub fn presenter(&self) -> &Arc<Presenter> {
        &self.presenter
    }

    /// Must be called from within a tokio runtime.
    #[instrument(skip_all, fields(tasks = tasks.len()))]
    pub fn schedule_reminders(&self, tasks: &[Task]) {
        let now = self.clock.now();
        let mut armed = self.armed.lock();
        armed.retain(|_, handle| !handle.is_finished());

        for task in tasks {
            let cancelled = Self::cancel_locked(&mut armed, &task.id);
            if cancelled > 0 {
                debug!(task = %task.id, cancelled, "replacing previously armed reminders");
            }
            for reminder in plan_reminders(task, now) {
                debug!(
                    task = %reminder.task_id,
                    kind = ?reminder.kind,
                    delay_ms = reminder.delay.as_millis() as u64,
                    "arming reminder"
                );
                let key = reminder.key();
                let handle = self.arm(reminder);
                armed.insert(key, handle);
            }
        }
    }

    /// Live timers, sorted by task then kind.
    pub fn armed(&self) -> Vec<ReminderKey> {
        let mut armed = self.armed.lock();
        armed.retain(|_, handle| !handle.is_finished());
        let mut keys: Vec<ReminderKey> = armed.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn cancel_task(&self, task_id: &TaskId) -> usize {
        Self::cancel_locked(&mut self.armed.lock(), task_id)
    }

    pub fn cancel_all(&self) {
        for (_, handle) in self.armed.lock().drain() {
            handle.abort();
        }
    }

    fn arm(&self, reminder: PlannedReminder) -> JoinHandle<()> {
        let presenter = Arc::clone(&self.presenter);
        tokio::spawn(async move {
            tokio::time::sleep(reminder.delay).await;
            presenter
                .present(&reminder.title, &reminder.body, &reminder.task_id)
                .await;
        })
    }

    fn cancel_locked(armed: &mut HashMap<ReminderKey, JoinHandle<()>>, task_id: &TaskId) -> usize {
        let mut cancelled = 0;
        for kind in ReminderKind::ALL {
            let key = ReminderKey {
                task_id: task_id.clone(),
                kind,
            };
            if let Some(handle) = armed.remove(&key) {
                if !handle.is_finished() {
                    cancelled += 1;
                }
                handle.abort();
            }
        }
        cancelled
    }
}

impl Drop for ReminderScheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
