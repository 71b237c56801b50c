//! Offline cache worker.
//!
//! Keeps the app shell in a versioned cache, answers same-origin GETs
//! cache-first, purges superseded cache versions on activation and relays
//! push messages to the notification display.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use taskminder_notify::platform::{ClickAction, Notification, NotificationDisplay};
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::http::{same_origin, Request, Response};
use crate::network::{FetchError, HttpNetwork, Network};
use crate::storage::{CacheError, CacheStorage, MemoryCacheStorage};

pub const CACHE_NAME: &str = "todo-verify-v1";

pub const APP_SHELL: [&str; 12] = [
    "/",
    "/index.html",
    "/static/css/main.css",
    "/manifest.json",
    "/icons/icon-72x72.png",
    "/icons/icon-96x96.png",
    "/icons/icon-128x128.png",
    "/icons/icon-144x144.png",
    "/icons/icon-152x152.png",
    "/icons/icon-192x192.png",
    "/icons/icon-384x384.png",
    "/icons/icon-512x512.png",
];

pub const PUSH_TITLE: &str = "Todo Verify";
pub const DEFAULT_PUSH_BODY: &str = "New notification from Todo Verify";
pub const PUSH_ICON: &str = "icons/icon-192x192.png";
pub const PUSH_BADGE: &str = "icons/icon-72x72.png";

/// URL fragments that mark dynamic responses which must never be cached.
const PASSTHROUGH_MARKERS: [&str; 2] = ["/api/", "groq.com"];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum WorkerState {
    Parsed,
    Installing,
    Installed,
    Activating,
    Active,
    Redundant,
}

#[derive(Debug, thiserror::Error)]
pub enum InstallError {
    #[error("invalid app shell entry `{path}`: {source}")]
    Manifest {
        path: String,
        #[source]
        source: url::ParseError,
    },
    #[error("failed to fetch app shell asset: {0}")]
    Fetch(#[from] FetchError),
    #[error("app shell asset `{url}` returned status {status}")]
    BadStatus { url: String, status: u16 },
    #[error(transparent)]
    Cache(#[from] CacheError),
}

#[derive(Debug, thiserror::Error)]
pub enum ActivateError {
    #[error("worker cannot activate from state {0:?}")]
    NotInstalled(WorkerState),
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Result of offering a request to the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchDecision {
    /// Not intercepted; the host sends the request to the network itself.
    Bypass,
    Respond(Response),
}

/// Pages the worker can control.
#[async_trait]
pub trait Clients: Send + Sync {
    /// Take control of already open pages.
    async fn claim(&self);

    async fn open_window(&self, path: &str);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DetachedClients;

#[async_trait]
impl Clients for DetachedClients {
    async fn claim(&self) {
        debug!("no clients to claim");
    }

    async fn open_window(&self, path: &str) {
        info!(%path, "open window requested without a client host");
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    pub origin: Url,
    pub cache_name: String,
    pub app_shell: Vec<String>,
}

impl WorkerConfig {
    pub fn new(origin: Url) -> Self {
        Self {
            origin,
            cache_name: CACHE_NAME.to_string(),
            app_shell: APP_SHELL.iter().map(|path| path.to_string()).collect(),
        }
    }
}

#[derive(Debug)]
struct Lifecycle {
    state: WorkerState,
    skip_waiting: bool,
}

pub struct CacheWorker {
    config: WorkerConfig,
    storage: Arc<dyn CacheStorage>,
    network: Arc<dyn Network>,
    clients: Arc<dyn Clients>,
    display: Option<Arc<dyn NotificationDisplay>>,
    lifecycle: RwLock<Lifecycle>,
}

pub struct CacheWorkerBuilder {
    config: WorkerConfig,
    storage: Option<Arc<dyn CacheStorage>>,
    network: Option<Arc<dyn Network>>,
    clients: Option<Arc<dyn Clients>>,
    display: Option<Arc<dyn NotificationDisplay>>,
}

impl CacheWorkerBuilder {
    pub fn new(origin: Url) -> Self {
        Self {
            config: WorkerConfig::new(origin),
            storage: None,
            network: None,
            clients: None,
            display: None,
        }
    }

    pub fn cache_name(mut self, name: impl Into<String>) -> Self {
        self.config.cache_name = name.into();
        self
    }

    pub fn app_shell<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.app_shell = paths.into_iter().map(Into::into).collect();
        self
    }

    pub fn storage(mut self, storage: Arc<dyn CacheStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn network(mut self, network: Arc<dyn Network>) -> Self {
        self.network = Some(network);
        self
    }

    pub fn clients(mut self, clients: Arc<dyn Clients>) -> Self {
        self.clients = Some(clients);
        self
    }

    pub fn display(mut self, display: Arc<dyn NotificationDisplay>) -> Self {
        self.display = Some(display);
        self
    }

    pub fn build(self) -> CacheWorker {
        CacheWorker {
            config: self.config,
            storage: self
                .storage
                .unwrap_or_else(|| Arc::new(MemoryCacheStorage::new())),
            network: self.network.unwrap_or_else(|| Arc::new(HttpNetwork::new())),
            clients: self.clients.unwrap_or_else(|| Arc::new(DetachedClients)),
            display: self.display,
            lifecycle: RwLock::new(Lifecycle {
                state: WorkerState::Parsed,
                skip_waiting: false,
            }),
        }
    }
}

impl CacheWorker {
    pub fn builder(origin: Url) -> CacheWorkerBuilder {
        CacheWorkerBuilder::new(origin)
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn state(&self) -> WorkerState {
        self.lifecycle.read().state
    }

    /// Whether install asked to activate without waiting for old pages to close.
    pub fn skips_waiting(&self) -> bool {
        self.lifecycle.read().skip_waiting
    }

    /// Caches the whole app shell or nothing.
    #[instrument(skip(self), fields(cache = %self.config.cache_name))]
    pub async fn install(&self) -> Result<(), InstallError> {
        self.set_state(WorkerState::Installing);
        info!("caching app shell");
        match self.cache_app_shell().await {
            Ok(count) => {
                let mut lifecycle = self.lifecycle.write();
                lifecycle.skip_waiting = true;
                lifecycle.state = WorkerState::Installed;
                info!(assets = count, "install complete");
                Ok(())
            }
            Err(err) => {
                warn!(%err, "install failed");
                self.set_state(WorkerState::Redundant);
                Err(err)
            }
        }
    }

    /// Deletes every cache but the current one and claims open pages.
    /// Returns the names that were purged.
    #[instrument(skip(self), fields(cache = %self.config.cache_name))]
    pub async fn activate(&self) -> Result<Vec<String>, ActivateError> {
        let state = self.state();
        if state != WorkerState::Installed {
            return Err(ActivateError::NotInstalled(state));
        }
        self.set_state(WorkerState::Activating);

        let purged = match self.purge_old_caches().await {
            Ok(purged) => purged,
            Err(err) => {
                warn!(%err, "activate failed, worker stays installed");
                self.set_state(WorkerState::Installed);
                return Err(err.into());
            }
        };

        self.clients.claim().await;
        self.set_state(WorkerState::Active);
        info!(purged = purged.len(), "activate complete");
        Ok(purged)
    }

    /// Whether `request` goes through the cache at all.
    pub fn intercepts(&self, request: &Request) -> bool {
        if request.method != Method::GET || !same_origin(&request.url, &self.config.origin) {
            return false;
        }
        let url = request.url.as_str();
        !PASSTHROUGH_MARKERS.iter().any(|marker| url.contains(marker))
    }

    #[instrument(skip(self, request), fields(url = %request.url))]
    pub async fn fetch(&self, request: &Request) -> Result<FetchDecision, FetchError> {
        if !self.intercepts(request) {
            return Ok(FetchDecision::Bypass);
        }

        match self.storage.match_any(request).await {
            Ok(Some(cached)) => {
                debug!("serving from cache");
                return Ok(FetchDecision::Respond(cached));
            }
            Ok(None) => {}
            Err(err) => warn!(%err, "cache lookup failed, falling back to network"),
        }

        debug!("fetching resource");
        let response = self.network.fetch(request).await?;
        if response.is_cacheable() {
            self.store(request, response.clone()).await;
        }
        Ok(FetchDecision::Respond(response))
    }

    #[instrument(skip(self, payload))]
    pub async fn push(&self, payload: Option<&str>) {
        let Some(display) = &self.display else {
            info!("push received but notifications are unsupported");
            return;
        };
        let body = payload
            .filter(|text| !text.is_empty())
            .unwrap_or(DEFAULT_PUSH_BODY);
        let notification = Notification::new(PUSH_TITLE, body, PUSH_ICON)
            .with_badge(PUSH_BADGE)
            .on_click(ClickAction::CloseAndOpen { path: "/".into() });
        if let Err(err) = display.show(notification).await {
            warn!(%err, "unable to show push notification");
        }
    }

    pub async fn notification_click(&self, tag: &str) {
        if let Some(display) = &self.display {
            if let Err(err) = display.close(tag).await {
                warn!(%err, %tag, "unable to close notification");
            }
        }
        self.clients.open_window("/").await;
    }

    async fn cache_app_shell(&self) -> Result<usize, InstallError> {
        let cache = self.storage.open(&self.config.cache_name).await?;

        let mut fetched = Vec::with_capacity(self.config.app_shell.len());
        for path in &self.config.app_shell {
            let url = self
                .config
                .origin
                .join(path)
                .map_err(|source| InstallError::Manifest {
                    path: path.clone(),
                    source,
                })?;
            let request = Request::get(url);
            let response = self.network.fetch(&request).await?;
            if !response.ok() {
                return Err(InstallError::BadStatus {
                    url: request.url.to_string(),
                    status: response.status,
                });
            }
            fetched.push((request, response));
        }

        let count = fetched.len();
        for (request, response) in fetched {
            if let Err(err) = cache.put(&request, response).await {
                if let Err(cleanup) = self.storage.delete(&self.config.cache_name).await {
                    warn!(%cleanup, "unable to drop partially written cache");
                }
                return Err(err.into());
            }
        }
        Ok(count)
    }

    async fn purge_old_caches(&self) -> Result<Vec<String>, CacheError> {
        let mut purged = Vec::new();
        for name in self.storage.keys().await? {
            if name == self.config.cache_name {
                continue;
            }
            info!(cache = %name, "removing old cache");
            if self.storage.delete(&name).await? {
                purged.push(name);
            }
        }
        Ok(purged)
    }

    async fn store(&self, request: &Request, response: Response) {
        let result = match self.storage.open(&self.config.cache_name).await {
            Ok(cache) => cache.put(request, response).await,
            Err(err) => Err(err),
        };
        if let Err(err) = result {
            warn!(%err, "unable to cache response");
        }
    }

    fn set_state(&self, state: WorkerState) {
        debug!(?state, "worker state change");
        self.lifecycle.write().state = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn worker() -> CacheWorker {
        CacheWorker::builder(Url::parse("https://todo.test/").unwrap()).build()
    }

    fn get(url: &str) -> Request {
        Request::get(Url::parse(url).unwrap())
    }

    #[test]
    fn intercepts_same_origin_static_gets() {
        let worker = worker();
        assert!(worker.intercepts(&get("https://todo.test/static/css/main.css")));
        assert!(worker.intercepts(&get("https://todo.test/?task=3")));
    }

    #[test]
    fn skips_api_inference_and_foreign_requests() {
        let worker = worker();
        assert!(!worker.intercepts(&get("https://todo.test/api/tasks")));
        assert!(!worker.intercepts(&get("https://todo.test/proxy?target=api.groq.com")));
        assert!(!worker.intercepts(&get("https://api.groq.com/openai/v1/chat")));
        assert!(!worker.intercepts(&get("https://cdn.example.com/lib.js")));
        let post = Request::new(Method::POST, Url::parse("https://todo.test/upload").unwrap());
        assert!(!worker.intercepts(&post));
    }

    #[tokio::test]
    async fn activate_requires_install() {
        let worker = worker();
        assert!(matches!(
            worker.activate().await,
            Err(ActivateError::NotInstalled(WorkerState::Parsed))
        ));
    }

    #[test]
    fn default_manifest_lists_app_shell() {
        let config = WorkerConfig::new(Url::parse("https://todo.test/").unwrap());
        assert_eq!(config.cache_name, CACHE_NAME);
        assert_eq!(config.app_shell.len(), 12);
        assert_eq!(config.app_shell[0], "/");
        assert_eq!(
            config.app_shell.iter().filter(|p| p.starts_with("/icons/")).count(),
            8
        );
    }
}
