pub mod platform;
pub mod presenter;
pub mod runtime;
pub mod scheduler;
pub mod task;

pub use crate::presenter::Presenter;
pub use crate::runtime::{initialize, NotificationRuntime};
pub use crate::scheduler::{Clock, ReminderKind, ReminderScheduler, SystemClock};
pub use crate::task::{Task, TaskId, TasksUpdated};
