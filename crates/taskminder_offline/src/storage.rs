//! Named request -> response caches, modelled on the browser Cache Storage API.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::http::{Request, Response};

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache I/O failed at `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("corrupt cache record `{path}`: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("unable to enumerate cache directory: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("invalid cache name `{0}`")]
    InvalidName(String),
    #[error("blocking cache task failed: {0}")]
    Blocking(#[from] tokio::task::JoinError),
}

#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, request: &Request) -> Result<Option<Response>, CacheError>;

    /// Overwrites any entry stored under the same key.
    async fn put(&self, request: &Request, response: Response) -> Result<(), CacheError>;

    async fn keys(&self) -> Result<Vec<String>, CacheError>;
}

#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Opens `name`, creating an empty cache if it does not exist.
    async fn open(&self, name: &str) -> Result<Arc<dyn Cache>, CacheError>;

    async fn keys(&self) -> Result<Vec<String>, CacheError>;

    /// Returns whether a cache was removed.
    async fn delete(&self, name: &str) -> Result<bool, CacheError>;

    /// Looks `request` up in every cache, in `keys` order.
    async fn match_any(&self, request: &Request) -> Result<Option<Response>, CacheError> {
        for name in self.keys().await? {
            let cache = self.open(&name).await?;
            if let Some(response) = cache.get(request).await? {
                return Ok(Some(response));
            }
        }
        Ok(None)
    }
}

#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<BTreeMap<String, Response>>,
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, request: &Request) -> Result<Option<Response>, CacheError> {
        Ok(self.entries.read().get(&request.cache_key()).cloned())
    }

    async fn put(&self, request: &Request, response: Response) -> Result<(), CacheError> {
        self.entries.write().insert(request.cache_key(), response);
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, CacheError> {
        Ok(self.entries.read().keys().cloned().collect())
    }
}

#[derive(Debug, Default)]
pub struct MemoryCacheStorage {
    caches: RwLock<BTreeMap<String, Arc<MemoryCache>>>,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn open(&self, name: &str) -> Result<Arc<dyn Cache>, CacheError> {
        let cache = self
            .caches
            .write()
            .entry(name.to_string())
            .or_default()
            .clone();
        Ok(cache)
    }

    async fn keys(&self) -> Result<Vec<String>, CacheError> {
        Ok(self.caches.read().keys().cloned().collect())
    }

    async fn delete(&self, name: &str) -> Result<bool, CacheError> {
        Ok(self.caches.write().remove(name).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn request(path: &str) -> Request {
        Request::get(Url::parse("https://todo.test/").unwrap().join(path).unwrap())
    }

    #[tokio::test]
    async fn open_creates_and_reuses() {
        let storage = MemoryCacheStorage::new();
        let cache = storage.open("v1").await.unwrap();
        cache.put(&request("/a"), Response::basic(200, "a")).await.unwrap();

        let again = storage.open("v1").await.unwrap();
        assert_eq!(again.keys().await.unwrap(), vec!["https://todo.test/a".to_string()]);
        assert_eq!(storage.keys().await.unwrap(), vec!["v1".to_string()]);
    }

    #[tokio::test]
    async fn match_any_searches_every_cache() {
        let storage = MemoryCacheStorage::new();
        storage.open("v1").await.unwrap();
        let v2 = storage.open("v2").await.unwrap();
        v2.put(&request("/b"), Response::basic(200, "b")).await.unwrap();

        let hit = storage.match_any(&request("/b")).await.unwrap().unwrap();
        assert_eq!(hit.body, "b");
        assert!(storage.match_any(&request("/c")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_reports_presence() {
        let storage = MemoryCacheStorage::new();
        storage.open("old").await.unwrap();
        assert!(storage.delete("old").await.unwrap());
        assert!(!storage.delete("old").await.unwrap());
    }
}
