//! Response cache for repository lookups
//!
//! Small response bodies are memoized in memory keyed by URL, and every
//! response is persisted on disk in a file named after the SHA-256 of the
//! URL path so later runs can skip the network. A 404 is persisted as a
//! "not found" marker; other failures are only remembered for this run.
//!
//! The cache directory is only ever appended to.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Bodies larger than this are served from disk only
pub const MAX_MEMOIZED_BODY: usize = 64 * 1024;

const NOT_FOUND_SUFFIX: &str = ".missing";

#[derive(Debug, Clone)]
enum Cached {
    Body(Arc<Vec<u8>>),
    NotFound,
}

/// URL-keyed response cache backed by an optional directory
#[derive(Debug, Default)]
pub struct ResponseCache {
    dir: Option<PathBuf>,
    memory: Mutex<HashMap<String, Cached>>,
}

impl ResponseCache {
    /// A cache persisted in `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create cache directory: {}", dir.display()))?;
        Ok(Self {
            dir: Some(dir),
            memory: Mutex::new(HashMap::new()),
        })
    }

    /// A cache that only lives for this process
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Cache key of a URL: hex SHA-256 of its path and query
    pub fn key_for_url(url: &str) -> String {
        let path = reqwest::Url::parse(url)
            .map(|parsed| match parsed.query() {
                Some(query) => format!("{}?{}", parsed.path(), query),
                None => parsed.path().to_string(),
            })
            .unwrap_or_else(|_| url.to_string());
        hex::encode(Sha256::digest(path.as_bytes()))
    }

    fn body_path(dir: &Path, key: &str) -> PathBuf {
        dir.join(key)
    }

    fn not_found_path(dir: &Path, key: &str) -> PathBuf {
        dir.join(format!("{key}{NOT_FOUND_SUFFIX}"))
    }

    fn remember(&self, url: &str, cached: Cached) {
        if let Cached::Body(body) = &cached {
            if body.len() > MAX_MEMOIZED_BODY {
                return;
            }
        }
        if let Ok(mut memory) = self.memory.lock() {
            memory.insert(url.to_string(), cached);
        }
    }

    fn lookup(&self, url: &str) -> Result<Option<Cached>> {
        if let Some(cached) = self.memory.lock().ok().and_then(|m| m.get(url).cloned()) {
            return Ok(Some(cached));
        }

        let Some(dir) = &self.dir else {
            return Ok(None);
        };
        let key = Self::key_for_url(url);

        if Self::not_found_path(dir, &key).exists() {
            self.remember(url, Cached::NotFound);
            return Ok(Some(Cached::NotFound));
        }

        let body_path = Self::body_path(dir, &key);
        if body_path.exists() {
            let body = std::fs::read(&body_path)
                .with_context(|| format!("Failed to read cache: {}", body_path.display()))?;
            let cached = Cached::Body(Arc::new(body));
            self.remember(url, cached.clone());
            return Ok(Some(cached));
        }

        Ok(None)
    }

    fn store(&self, url: &str, cached: Cached) {
        if let Some(dir) = &self.dir {
            let key = Self::key_for_url(url);
            let result = match &cached {
                Cached::Body(body) => std::fs::write(Self::body_path(dir, &key), body.as_slice()),
                Cached::NotFound => std::fs::write(Self::not_found_path(dir, &key), b""),
            };
            // Caching is best effort
            if let Err(e) = result {
                warn!("Failed to write cache entry for {}: {}", url, e);
            }
        }
        self.remember(url, cached);
    }

    /// Return the cached response for `url`, or run `fetch` and cache its outcome
    ///
    /// `fetch` resolving to `Ok(None)` is recorded as not found on disk.
    /// Errors are logged, not propagated, and are not retried until the
    /// cache is recreated.
    pub async fn get_or_fetch<F, Fut>(&self, url: &str, fetch: F) -> Result<Option<Arc<Vec<u8>>>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<Vec<u8>>>>,
    {
        match self.lookup(url)? {
            Some(Cached::Body(body)) => {
                debug!("Cache hit for {}", url);
                return Ok(Some(body));
            }
            Some(Cached::NotFound) => {
                debug!("Cached not-found for {}", url);
                return Ok(None);
            }
            None => {}
        }

        match fetch().await {
            Ok(Some(body)) => {
                let body = Arc::new(body);
                self.store(url, Cached::Body(body.clone()));
                Ok(Some(body))
            }
            Ok(None) => {
                debug!("Not found: {}", url);
                self.store(url, Cached::NotFound);
                Ok(None)
            }
            Err(e) => {
                warn!("Failed to fetch {}: {:#}", url, e);
                self.remember(url, Cached::NotFound);
                Ok(None)
            }
        }
    }
}
