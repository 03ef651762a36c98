//! Best-effort session cache
//!
//! Mirrors the payment session (review rows and confirmed references) so a
//! restarted client can pick up where it left off. Nothing read from here is
//! authoritative: fresh server data always replaces it.

pub mod error;
pub mod keys;
#[cfg(feature = "cache")]
pub mod redis_cache;

pub use error::{CacheError, CacheResult};
pub use keys::SessionKey;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::debug;

/// String store keyed by [`SessionKey`].
#[async_trait]
pub trait SessionCache: Send + Sync {
    async fn get_raw(&self, key: SessionKey) -> CacheResult<Option<String>>;

    async fn set_raw(&self, key: SessionKey, value: String) -> CacheResult<()>;

    async fn delete(&self, key: SessionKey) -> CacheResult<()>;
}

pub async fn get_json<T: DeserializeOwned>(
    cache: &dyn SessionCache,
    key: SessionKey,
) -> CacheResult<Option<T>> {
    match cache.get_raw(key).await? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

pub async fn set_json<T: Serialize + ?Sized>(
    cache: &dyn SessionCache,
    key: SessionKey,
    value: &T,
) -> CacheResult<()> {
    let raw = serde_json::to_string(value)?;
    cache.set_raw(key, raw).await
}

/// One JSON file per key under a directory.
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: SessionKey) -> PathBuf {
        self.dir
            .join(format!("{}.json", key.to_string().replace(':', "_")))
    }
}

#[async_trait]
impl SessionCache for FileCache {
    async fn get_raw(&self, key: SessionKey) -> CacheResult<Option<String>> {
        match tokio::fs::read_to_string(self.path_for(key)).await {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set_raw(&self, key: SessionKey, value: String) -> CacheResult<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| CacheError::ConnectionError(e.to_string()))?;
        let path = self.path_for(key);
        debug!(path = %path.display(), "writing session cache entry");
        tokio::fs::write(path, value).await?;
        Ok(())
    }

    async fn delete(&self, key: SessionKey) -> CacheResult<()> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Process-local cache, also used when caching is switched off.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> CacheResult<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|e| CacheError::OperationError(e.to_string()))
    }
}

#[async_trait]
impl SessionCache for MemoryCache {
    async fn get_raw(&self, key: SessionKey) -> CacheResult<Option<String>> {
        Ok(self.lock()?.get(&key.to_string()).cloned())
    }

    async fn set_raw(&self, key: SessionKey, value: String) -> CacheResult<()> {
        self.lock()?.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: SessionKey) -> CacheResult<()> {
        self.lock()?.remove(&key.to_string());
        Ok(())
    }
}
