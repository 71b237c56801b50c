use std::path::Path;

use anyhow::{Context, Result};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc::UnboundedSender;

/// Signals `changes` whenever the task file is created or modified.
///
/// The parent directory is watched rather than the file itself so editors
/// that save by renaming a temporary file are still picked up.
pub fn watch_tasks_file(path: &Path, changes: UnboundedSender<()>) -> Result<RecommendedWatcher> {
    let file_name = path
        .file_name()
        .map(|name| name.to_os_string())
        .with_context(|| format!("task file `{}` has no file name", path.display()))?;
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => Path::new(".").to_path_buf(),
    };

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| match res {
        Ok(event) => {
            let touches_file = event
                .paths
                .iter()
                .any(|changed| changed.file_name() == Some(file_name.as_os_str()));
            if touches_file && (event.kind.is_modify() || event.kind.is_create()) {
                tracing::debug!(?event, "task file change detected");
                // Send only fails once the app is shutting down.
                let _ = changes.send(());
            }
        }
        Err(err) => tracing::warn!(%err, "task file watcher error"),
    })?;
    watcher
        .watch(&parent, RecursiveMode::NonRecursive)
        .with_context(|| format!("unable to watch `{}`", parent.display()))?;
    Ok(watcher)
}
