use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use taskminder_notify::platform::{NotificationDisplay, PermissionStatus, StaticPermission};
use taskminder_notify::task::load_tasks_file;
use taskminder_notify::{initialize, NotificationRuntime, Presenter, SystemClock};
use taskminder_offline::worker::CACHE_NAME;
use taskminder_offline::{CacheStorage, CacheWorker, DirCacheStorage, MemoryCacheStorage};
use tokio::sync::mpsc;
use tracing::{info, warn};
use url::Url;

use crate::console::{ConsoleClients, ConsoleDisplay};
use crate::watch::watch_tasks_file;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppConfig {
    pub tasks_file: Option<PathBuf>,
    pub cache_dir: Option<PathBuf>,
    pub origin: Option<Url>,
    pub cache_name: String,
    pub permission: PermissionStatus,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            tasks_file: None,
            cache_dir: None,
            origin: None,
            cache_name: CACHE_NAME.to_string(),
            permission: PermissionStatus::Default,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        let value = |key: &str| {
            lookup(key)
                .map(|raw| raw.trim().to_string())
                .filter(|raw| !raw.is_empty())
        };

        if let Some(path) = value("TASKMINDER_TASKS_FILE") {
            config.tasks_file = Some(PathBuf::from(path));
        }
        if let Some(path) = value("TASKMINDER_CACHE_DIR") {
            config.cache_dir = Some(PathBuf::from(path));
        }
        if let Some(origin) = value("TASKMINDER_ORIGIN") {
            let parsed = Url::parse(&origin)
                .with_context(|| format!("TASKMINDER_ORIGIN `{origin}` is not a valid URL"))?;
            config.origin = Some(parsed);
        }
        if let Some(name) = value("TASKMINDER_CACHE_NAME") {
            config.cache_name = name;
        }
        if let Some(raw) = value("TASKMINDER_PERMISSION") {
            match PermissionStatus::parse(&raw) {
                Some(status) => config.permission = status,
                None => warn!(value = %raw, "ignoring unknown TASKMINDER_PERMISSION"),
            }
        }
        Ok(config)
    }
}

pub async fn run(config: AppConfig) -> Result<()> {
    anyhow::ensure!(
        config.tasks_file.is_some() || config.origin.is_some(),
        "nothing to do: set TASKMINDER_TASKS_FILE and/or TASKMINDER_ORIGIN"
    );

    let display = Arc::new(ConsoleDisplay::new());
    // A terminal has no prompt; launching with reminders configured counts as consent.
    let permission = Arc::new(StaticPermission::prompting(
        config.permission,
        PermissionStatus::Granted,
    ));
    let presenter = Arc::new(Presenter::new(permission, display.clone()));
    let runtime = initialize(presenter, Arc::new(SystemClock)).await;

    let _worker = match &config.origin {
        Some(origin) => Some(start_worker(&config, origin.clone(), display.clone()).await?),
        None => None,
    };

    let (changes_tx, mut changes_rx) = mpsc::unbounded_channel();
    let _watcher = match &config.tasks_file {
        Some(path) => {
            dispatch_task_file(path, &runtime);
            Some(watch_tasks_file(path, changes_tx)?)
        }
        None => None,
    };

    info!("taskminder running, press Ctrl-C to exit");
    loop {
        tokio::select! {
            Some(()) = changes_rx.recv() => {
                if let Some(path) = &config.tasks_file {
                    dispatch_task_file(path, &runtime);
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("unable to listen for Ctrl-C")?;
                info!("shutting down");
                break;
            }
        }
    }
    runtime.scheduler().cancel_all();
    Ok(())
}

/// Reads the task file and fires it as a `tasksUpdated` event.
pub fn dispatch_task_file(path: &Path, runtime: &NotificationRuntime) {
    match load_tasks_file(path) {
        Ok(event) => {
            if runtime.handle_event(&event) {
                info!(armed = runtime.armed().len(), "reminders scheduled");
            }
        }
        Err(err) => warn!(error = %format!("{err:#}"), "skipping task file update"),
    }
}

async fn start_worker(
    config: &AppConfig,
    origin: Url,
    display: Arc<dyn NotificationDisplay>,
) -> Result<CacheWorker> {
    let storage: Arc<dyn CacheStorage> = match &config.cache_dir {
        Some(dir) => Arc::new(DirCacheStorage::new(dir).with_context(|| {
            format!("unable to prepare cache directory `{}`", dir.display())
        })?),
        None => Arc::new(MemoryCacheStorage::new()),
    };
    let worker = CacheWorker::builder(origin)
        .cache_name(config.cache_name.clone())
        .storage(storage)
        .clients(Arc::new(ConsoleClients))
        .display(display)
        .build();

    worker.install().await.context("offline worker install failed")?;
    let purged = worker
        .activate()
        .await
        .context("offline worker activation failed")?;
    info!(cache = %config.cache_name, purged = ?purged, "offline cache ready");
    Ok(worker)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_env() {
        let config = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.cache_name, "todo-verify-v1");
    }

    #[test]
    fn reads_all_settings() {
        let config = AppConfig::from_lookup(lookup(&[
            ("TASKMINDER_TASKS_FILE", "/tmp/tasks.json"),
            ("TASKMINDER_CACHE_DIR", "/tmp/cache"),
            ("TASKMINDER_ORIGIN", "http://localhost:8501"),
            ("TASKMINDER_CACHE_NAME", "todo-verify-v2"),
            ("TASKMINDER_PERMISSION", "denied"),
        ]))
        .unwrap();
        assert_eq!(config.tasks_file, Some(PathBuf::from("/tmp/tasks.json")));
        assert_eq!(config.cache_dir, Some(PathBuf::from("/tmp/cache")));
        assert_eq!(config.origin.unwrap().as_str(), "http://localhost:8501/");
        assert_eq!(config.cache_name, "todo-verify-v2");
        assert_eq!(config.permission, PermissionStatus::Denied);
    }

    #[test]
    fn blank_values_and_bad_permission_fall_back() {
        let config = AppConfig::from_lookup(lookup(&[
            ("TASKMINDER_CACHE_NAME", "   "),
            ("TASKMINDER_PERMISSION", "sometimes"),
        ]))
        .unwrap();
        assert_eq!(config.cache_name, CACHE_NAME);
        assert_eq!(config.permission, PermissionStatus::Default);
    }

    #[test]
    fn invalid_origin_is_an_error() {
        assert!(AppConfig::from_lookup(lookup(&[("TASKMINDER_ORIGIN", "not a url")])).is_err());
    }

    #[tokio::test]
    async fn run_requires_something_to_do() {
        assert!(run(AppConfig::default()).await.is_err());
    }

    #[tokio::test]
    async fn task_file_dispatch_arms_reminders() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("tasks.json");
        fs::write(
            &path,
            r#"{"detail":{"tasks":[{"id":1,"title":"Far","deadline":"2100-01-01T00:00:00Z"}]}}"#,
        )
        .unwrap();

        let permission = Arc::new(StaticPermission::new(PermissionStatus::Granted));
        let presenter = Arc::new(Presenter::new(permission, Arc::new(ConsoleDisplay::new())));
        let runtime = initialize(presenter, Arc::new(SystemClock)).await;

        dispatch_task_file(&path, &runtime);
        assert_eq!(runtime.armed().len(), 3);

        fs::write(&path, "garbage").unwrap();
        dispatch_task_file(&path, &runtime);
        assert_eq!(runtime.armed().len(), 3);
    }
}
