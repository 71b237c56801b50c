use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::debug;
use url::Url;
use walkdir::WalkDir;

use crate::http::{Request, Response, ResponseKind};
use crate::storage::{Cache, CacheError, CacheStorage};

const CACHES_DIR: &str = "caches";

/// Cache storage on disk: `<root>/caches/<cache name>/<sha256 of key>.{json,body}`.
///
/// Only `<root>/caches` belongs to the storage; anything else under the root
/// is never listed or deleted.
#[derive(Debug, Clone)]
pub struct DirCacheStorage {
    caches: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
struct EntryRecord {
    key: String,
    status: u16,
    kind: ResponseKind,
    url: Option<String>,
    headers: Vec<(String, String)>,
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> CacheError + '_ {
    move |source| CacheError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn is_valid_cache_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// Lists `dir` one level deep on the blocking pool.
async fn list_dir(dir: PathBuf) -> Result<Vec<(PathBuf, bool)>, CacheError> {
    tokio::task::spawn_blocking(move || {
        let mut entries = Vec::new();
        for entry in WalkDir::new(&dir).min_depth(1).max_depth(1) {
            let entry = entry?;
            entries.push((entry.path().to_path_buf(), entry.file_type().is_dir()));
        }
        Ok::<_, CacheError>(entries)
    })
    .await?
}

impl DirCacheStorage {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let caches = root.into().join(CACHES_DIR);
        std::fs::create_dir_all(&caches).map_err(io_error(&caches))?;
        Ok(Self { caches })
    }

    pub fn caches_dir(&self) -> &Path {
        &self.caches
    }

    fn cache_dir(&self, name: &str) -> Result<PathBuf, CacheError> {
        if !is_valid_cache_name(name) {
            return Err(CacheError::InvalidName(name.to_string()));
        }
        Ok(self.caches.join(name))
    }
}

#[async_trait]
impl CacheStorage for DirCacheStorage {
    async fn open(&self, name: &str) -> Result<Arc<dyn Cache>, CacheError> {
        let dir = self.cache_dir(name)?;
        fs::create_dir_all(&dir).await.map_err(io_error(&dir))?;
        Ok(Arc::new(DirCache { dir }))
    }

    async fn keys(&self) -> Result<Vec<String>, CacheError> {
        let mut names: Vec<String> = list_dir(self.caches.clone())
            .await?
            .into_iter()
            .filter(|(_, is_dir)| *is_dir)
            .filter_map(|(path, _)| {
                let name = path.file_name()?.to_str()?.to_string();
                if is_valid_cache_name(&name) {
                    Some(name)
                } else {
                    debug!(path = %path.display(), "ignoring foreign directory in cache root");
                    None
                }
            })
            .collect();
        names.sort();
        Ok(names)
    }

    async fn delete(&self, name: &str) -> Result<bool, CacheError> {
        let dir = self.cache_dir(name)?;
        match fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(source) => Err(CacheError::Io { path: dir, source }),
        }
    }
}

#[derive(Debug)]
struct DirCache {
    dir: PathBuf,
}

impl DirCache {
    fn entry_paths(&self, key: &str) -> (PathBuf, PathBuf) {
        let digest = Sha256::digest(key.as_bytes());
        let stem: String = digest.iter().map(|byte| format!("{byte:02x}")).collect();
        (
            self.dir.join(format!("{stem}.json")),
            self.dir.join(format!("{stem}.body")),
        )
    }

    async fn read_record(path: &Path) -> Result<Option<EntryRecord>, CacheError> {
        let raw = match fs::read(path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(CacheError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        serde_json::from_slice(&raw)
            .map(Some)
            .map_err(|source| CacheError::Corrupt {
                path: path.to_path_buf(),
                source,
            })
    }
}

#[async_trait]
impl Cache for DirCache {
    async fn get(&self, request: &Request) -> Result<Option<Response>, CacheError> {
        let key = request.cache_key();
        let (record_path, body_path) = self.entry_paths(&key);
        let Some(record) = Self::read_record(&record_path).await? else {
            return Ok(None);
        };
        if record.key != key {
            debug!(%key, stored = %record.key, "cache key collision, treating as miss");
            return Ok(None);
        }
        let body = fs::read(&body_path).await.map_err(io_error(&body_path))?;
        Ok(Some(Response {
            status: record.status,
            kind: record.kind,
            url: record.url.as_deref().and_then(|raw| Url::parse(raw).ok()),
            headers: record.headers,
            body: body.into(),
        }))
    }

    async fn put(&self, request: &Request, response: Response) -> Result<(), CacheError> {
        let key = request.cache_key();
        let (record_path, body_path) = self.entry_paths(&key);
        fs::write(&body_path, &response.body)
            .await
            .map_err(io_error(&body_path))?;
        let record = EntryRecord {
            key,
            status: response.status,
            kind: response.kind,
            url: response.url.map(String::from),
            headers: response.headers,
        };
        let raw = serde_json::to_vec(&record).map_err(|source| CacheError::Corrupt {
            path: record_path.clone(),
            source,
        })?;
        // The record is written last so a torn write reads as a miss.
        fs::write(&record_path, raw)
            .await
            .map_err(io_error(&record_path))
    }

    async fn keys(&self) -> Result<Vec<String>, CacheError> {
        let mut keys = Vec::new();
        for (path, is_dir) in list_dir(self.dir.clone()).await? {
            let is_record =
                !is_dir && path.extension().and_then(|ext| ext.to_str()) == Some("json");
            if is_record {
                if let Some(record) = Self::read_record(&path).await? {
                    keys.push(record.key);
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}
