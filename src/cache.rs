//! Optional caching of rendered output.
//!
//! Entries are keyed by the module's build timestamp, so rebuilding a module
//! naturally moves readers to a fresh key without explicit invalidation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tracing::trace;

use crate::build::ModuleResolver;
use crate::error::Result;

/// Caller-chosen cache partition and entry lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheNamespace {
    pub key: String,
    /// `None` keeps entries until evicted.
    pub expires_in: Option<Duration>,
}

impl CacheNamespace {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            expires_in: None,
        }
    }

    pub fn expires_in(mut self, ttl: Duration) -> Self {
        self.expires_in = Some(ttl);
        self
    }
}

/// Storage behind the render cache.
pub trait CacheProvider: Send + Sync {
    /// Return the live value under `key`, or run `compute` and store its
    /// result. Errors from `compute` are returned and not stored.
    fn fetch(
        &self,
        key: &str,
        expires_in: Option<Duration>,
        compute: &mut dyn FnMut() -> Result<String>,
    ) -> Result<String>;
}

/// Never stores anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullCache;

impl CacheProvider for NullCache {
    fn fetch(
        &self,
        _key: &str,
        _expires_in: Option<Duration>,
        compute: &mut dyn FnMut() -> Result<String>,
    ) -> Result<String> {
        compute()
    }
}

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| now < at)
    }
}

/// In-process map with per-entry expiry.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl CacheProvider for MemoryCache {
    fn fetch(
        &self,
        key: &str,
        expires_in: Option<Duration>,
        compute: &mut dyn FnMut() -> Result<String>,
    ) -> Result<String> {
        let now = Instant::now();
        {
            let mut entries = self.lock();
            match entries.get(key) {
                Some(entry) if entry.is_live(now) => {
                    trace!(key, "Cache hit");
                    return Ok(entry.value.clone());
                }
                Some(_) => {
                    entries.remove(key);
                }
                None => {}
            }
        }

        // Not holding the lock while computing: renders can take a while.
        trace!(key, "Cache miss");
        let value = compute()?;
        self.lock().insert(
            key.to_string(),
            Entry {
                value: value.clone(),
                expires_at: expires_in.map(|ttl| Instant::now() + ttl),
            },
        );
        Ok(value)
    }
}

/// Key for a module's rendered output: `{namespace}/{module_path}:{secs}`,
/// with an empty timestamp when the module isn't built.
pub fn cache_key(namespace: &str, module_path: &str, built_at: Option<SystemTime>) -> String {
    let stamp = built_at
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs().to_string())
        .unwrap_or_default();
    format!("{}/{}:{}", namespace, module_path, stamp)
}

/// Render cache in front of evaluation.
#[derive(Clone)]
pub struct RenderCache {
    provider: Arc<dyn CacheProvider>,
}

impl Default for RenderCache {
    fn default() -> Self {
        Self::new(Arc::new(NullCache))
    }
}

impl RenderCache {
    pub fn new(provider: Arc<dyn CacheProvider>) -> Self {
        Self { provider }
    }

    /// Fetch the rendering of `module_path` from the cache, computing it on a
    /// miss. Without a namespace the cache is bypassed.
    pub fn fetch_or_compute<F>(
        &self,
        resolver: &ModuleResolver,
        namespace: Option<&CacheNamespace>,
        module_path: &str,
        compute: F,
    ) -> Result<String>
    where
        F: FnOnce() -> Result<String>,
    {
        let Some(namespace) = namespace else {
            return compute();
        };

        let key = cache_key(&namespace.key, module_path, resolver.module_timestamp(module_path)?);
        let mut compute = Some(compute);
        self.provider.fetch(&key, namespace.expires_in, &mut || match compute.take() {
            Some(f) => f(),
            None => Err(crate::error::SsrError::Worker(
                "render computed twice for one cache fetch".to_string(),
            )),
        })
    }
}
