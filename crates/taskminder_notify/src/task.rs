use std::fmt;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{de, Deserialize, Deserializer, Serialize};

/// Opaque task identifier. The task source hands out integer row ids, but
/// anything string-like is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "RawTaskId", into = "String")]
pub struct TaskId(String);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTaskId {
    Number(i64),
    Text(String),
}

impl From<RawTaskId> for TaskId {
    fn from(raw: RawTaskId) -> Self {
        match raw {
            RawTaskId::Number(value) => Self(value.to_string()),
            RawTaskId::Text(value) => Self(value),
        }
    }
}

impl From<TaskId> for String {
    fn from(id: TaskId) -> Self {
        id.0
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<i64> for TaskId {
    fn from(value: i64) -> Self {
        Self(value.to_string())
    }
}

impl From<i32> for TaskId {
    fn from(value: i32) -> Self {
        Self(value.to_string())
    }
}

impl TaskId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    #[serde(deserialize_with = "deserialize_deadline")]
    pub deadline: DateTime<Utc>,
}

impl Task {
    pub fn new(id: impl Into<TaskId>, title: impl Into<String>, deadline: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            deadline,
        }
    }
}

/// Payload of the `tasksUpdated` event: `{ "detail": { "tasks": [...] } }`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TasksUpdated {
    #[serde(default)]
    pub detail: Option<TasksDetail>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TasksDetail {
    #[serde(default)]
    pub tasks: Option<Vec<Task>>,
}

impl TasksUpdated {
    pub fn with_tasks(tasks: Vec<Task>) -> Self {
        Self {
            detail: Some(TasksDetail { tasks: Some(tasks) }),
        }
    }

    /// Tasks carried by the event, if both `detail` and `tasks` are present.
    pub fn tasks(&self) -> Option<&[Task]> {
        self.detail.as_ref()?.tasks.as_deref()
    }

    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }
}

/// Reads a `tasksUpdated` payload from disk.
pub fn load_tasks_file(path: impl AsRef<Path>) -> Result<TasksUpdated> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path)
        .with_context(|| format!("unable to read task file `{}`", path.display()))?;
    TasksUpdated::from_json(&raw)
        .with_context(|| format!("malformed task file `{}`", path.display()))
}

/// Accepts RFC 3339, naive date-times in local time, and bare dates (UTC midnight).
pub fn parse_deadline(raw: &str) -> Option<DateTime<Utc>> {
    const NAIVE_FORMATS: [&str; 4] = [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ];

    let trimmed = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Local
                .from_local_datetime(&naive)
                .earliest()
                .map(|local| local.with_timezone(&Utc));
        }
    }
    let date = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d").ok()?;
    Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?))
}

fn deserialize_deadline<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_deadline(&raw).ok_or_else(|| de::Error::custom(format!("unrecognised deadline `{raw}`")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_numeric_and_text_ids() {
        let raw = r#"{"detail":{"tasks":[
            {"id": 7, "title": "Pay rent", "deadline": "2025-11-10T09:00:00Z"},
            {"id": "abc", "title": "Call Mom", "deadline": "2025-11-07", "status": "pending"}
        ]}}"#;
        let event = TasksUpdated::from_json(raw).unwrap();
        let tasks = event.tasks().expect("tasks present");
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].id.as_str(), "7");
        assert_eq!(tasks[1].id, TaskId::from("abc"));
        assert_eq!(
            tasks[1].deadline,
            Utc.with_ymd_and_hms(2025, 11, 7, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn event_without_detail_has_no_tasks() {
        assert!(TasksUpdated::from_json("{}").unwrap().tasks().is_none());
        assert!(TasksUpdated::from_json(r#"{"detail":{}}"#)
            .unwrap()
            .tasks()
            .is_none());
    }

    #[test]
    fn naive_deadline_is_local_time() {
        let parsed = parse_deadline("2025-03-01 18:30:00").unwrap();
        let expected = Local
            .with_ymd_and_hms(2025, 3, 1, 18, 30, 0)
            .earliest()
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(parsed, expected);
        assert_eq!(parse_deadline("2025-03-01T18:30"), Some(expected));
    }

    #[test]
    fn rejects_garbage_deadline() {
        assert!(parse_deadline("next tuesday").is_none());
        let raw = r#"{"id": 1, "title": "x", "deadline": "soon"}"#;
        assert!(serde_json::from_str::<Task>(raw).is_err());
    }

    #[test]
    fn loads_event_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.json");
        fs::write(
            &path,
            r#"{"detail":{"tasks":[{"id":1,"title":"Ship","deadline":"2030-01-01T00:00:00Z"}]}}"#,
        )
        .unwrap();
        let event = load_tasks_file(&path).unwrap();
        assert_eq!(event.tasks().unwrap()[0].title, "Ship");
        assert!(load_tasks_file(dir.path().join("missing.json")).is_err());
    }
}
