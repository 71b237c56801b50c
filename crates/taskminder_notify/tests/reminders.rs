use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use taskminder_notify::platform::{MemoryDisplay, PermissionStatus, StaticPermission};
use taskminder_notify::scheduler::{FixedClock, ReminderKey};
use taskminder_notify::{Presenter, ReminderKind, ReminderScheduler, Task, TaskId};

const HOUR: Duration = Duration::from_secs(60 * 60);

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap()
}

fn scheduler() -> (ReminderScheduler, Arc<MemoryDisplay>) {
    let display = Arc::new(MemoryDisplay::new());
    let permission = Arc::new(StaticPermission::new(PermissionStatus::Granted));
    let presenter = Arc::new(Presenter::new(permission, display.clone()));
    let clock = Arc::new(FixedClock::new(start()));
    (ReminderScheduler::new(presenter, clock), display)
}

async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

async fn advance(by: Duration) {
    tokio::time::advance(by).await;
    settle().await;
}

#[tokio::test(start_paused = true)]
async fn reminders_fire_at_their_offsets() {
    let (scheduler, display) = scheduler();
    let task = Task::new(1, "Quarterly report", start() + chrono::Duration::hours(30));
    scheduler.schedule_reminders(&[task]);
    settle().await;

    assert_eq!(
        scheduler.armed(),
        ReminderKind::ALL
            .iter()
            .map(|kind| ReminderKey {
                task_id: TaskId::from(1),
                kind: *kind,
            })
            .collect::<Vec<_>>()
    );

    advance(6 * HOUR - Duration::from_secs(1)).await;
    assert_eq!(display.shown_count(), 0);

    advance(Duration::from_secs(1)).await;
    assert_eq!(display.shown_count(), 1);
    assert!(display.get("task-1").unwrap().body.contains("due in 24 hours"));

    advance(23 * HOUR).await;
    assert_eq!(display.shown_count(), 2);
    assert!(display.get("task-1").unwrap().body.contains("due in 1 hour"));

    advance(HOUR).await;
    assert_eq!(display.shown_count(), 3);
    let last = display.get("task-1").unwrap();
    assert_eq!(last.title, "Task Deadline Reached");
    assert_eq!(display.visible().len(), 1);
    assert!(scheduler.armed().is_empty());
}

#[tokio::test(start_paused = true)]
async fn rescheduling_replaces_old_timers() {
    let (scheduler, display) = scheduler();
    scheduler.schedule_reminders(&[Task::new(5, "Dentist", start() + chrono::Duration::hours(30))]);
    settle().await;
    scheduler.schedule_reminders(&[Task::new(5, "Dentist", start() + chrono::Duration::hours(2))]);
    settle().await;

    let kinds: Vec<ReminderKind> = scheduler.armed().into_iter().map(|key| key.kind).collect();
    assert_eq!(kinds, vec![ReminderKind::HourBefore, ReminderKind::DueNow]);

    advance(HOUR).await;
    assert_eq!(display.shown_count(), 1);
    advance(HOUR).await;
    assert_eq!(display.shown_count(), 2);

    advance(40 * HOUR).await;
    assert_eq!(display.shown_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn past_deadlines_arm_nothing() {
    let (scheduler, display) = scheduler();
    scheduler.schedule_reminders(&[Task::new(2, "Overdue", start() - chrono::Duration::minutes(1))]);
    settle().await;
    assert!(scheduler.armed().is_empty());

    advance(48 * HOUR).await;
    assert_eq!(display.shown_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn dropping_scheduler_cancels_timers() {
    let (scheduler, display) = scheduler();
    scheduler.schedule_reminders(&[Task::new(3, "Call", start() + chrono::Duration::minutes(90))]);
    settle().await;
    assert_eq!(scheduler.armed().len(), 2);
    drop(scheduler);

    advance(2 * HOUR).await;
    assert_eq!(display.shown_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn cancel_task_only_touches_that_task() {
    let (scheduler, _display) = scheduler();
    scheduler.schedule_reminders(&[
        Task::new(1, "A", start() + chrono::Duration::hours(30)),
        Task::new(2, "B", start() + chrono::Duration::minutes(30)),
    ]);
    settle().await;
    assert_eq!(scheduler.armed().len(), 4);
    assert_eq!(scheduler.cancel_task(&TaskId::from(1)), 3);
    let remaining = scheduler.armed();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].task_id, TaskId::from(2));
}
