//! Cache layer
//!
//! Read-through caching for documents, list pages, the dashboard summary and
//! the calendar feed. The backing store is pluggable ([`CacheSink`]): an
//! in-process map or Redis. A disabled [`Cache`] is a no-op, so callers never
//! branch on whether caching is configured.
//!
//! The cache is never authoritative. Read failures degrade to a miss and
//! write failures are logged; neither reaches the caller.

mod invalidator;
mod memory;
mod redis_store;

pub use invalidator::CacheInvalidator;
pub use memory::MemoryCache;
pub use redis_store::RedisCache;

use crate::config::{CALENDAR_CACHE_KEY, DASHBOARD_CACHE_KEY};
use crate::database::{EntityKind, ListFilter};
use crate::error::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Key/value store backing the cache
#[async_trait]
pub trait CacheSink: Send + Sync {
    fn name(&self) -> &'static str;

    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// Delete every key matching `pattern`, a key prefix ending in `*`.
    /// Returns the number of keys removed.
    async fn delete_pattern(&self, pattern: &str) -> Result<u64>;
}

/// Shared cache handle
#[derive(Clone, Default)]
pub struct Cache {
    sink: Option<Arc<dyn CacheSink>>,
}

impl Cache {
    pub fn new(sink: Arc<dyn CacheSink>) -> Self {
        Self { sink: Some(sink) }
    }

    /// A cache that stores nothing
    pub fn disabled() -> Self {
        Self { sink: None }
    }

    pub fn memory() -> Self {
        Self::new(Arc::new(MemoryCache::new()))
    }

    pub fn redis(url: &str) -> Result<Self> {
        Ok(Self::new(Arc::new(RedisCache::open(url)?)))
    }

    pub fn is_enabled(&self) -> bool {
        self.sink.is_some()
    }

    pub fn backend_name(&self) -> &'static str {
        self.sink.as_ref().map(|s| s.name()).unwrap_or("disabled")
    }

    /// Cached value, or `None` on a miss, a disabled cache or any failure
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let sink = self.sink.as_ref()?;

        match sink.get(key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => {
                    tracing::debug!("Cache hit: {}", key);
                    Some(value)
                }
                Err(e) => {
                    tracing::warn!("Discarding unreadable cache entry {}: {}", key, e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("Cache read failed for {}: {}", key, e);
                None
            }
        }
    }

    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let Some(sink) = self.sink.as_ref() else {
            return;
        };

        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!("Failed to serialize cache entry {}: {}", key, e);
                return;
            }
        };

        if let Err(e) = sink.set(key, raw, ttl).await {
            tracing::warn!("Cache write failed for {}: {}", key, e);
        }
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        match &self.sink {
            Some(sink) => sink.delete(key).await,
            None => Ok(()),
        }
    }

    pub async fn delete_pattern(&self, pattern: &str) -> Result<u64> {
        match &self.sink {
            Some(sink) => sink.delete_pattern(pattern).await,
            None => Ok(0),
        }
    }
}

/// Cache key layout
pub mod keys {
    use super::*;

    pub fn document(kind: EntityKind, id: &str) -> String {
        format!("{}:{}", kind, id)
    }

    /// Key of one list page; every filter field is part of the key
    pub fn list(kind: EntityKind, filter: &ListFilter) -> String {
        let (page, per_page) = crate::database::repository::page_bounds(filter);
        format!(
            "{}:list:{}:{}:{}:{}",
            kind,
            filter.status.map(|s| s.as_str()).unwrap_or("all"),
            page,
            per_page,
            filter.search.as_deref().map(str::trim).unwrap_or_default()
        )
    }

    /// Pattern matching every list page of a kind
    pub fn list_pattern(kind: EntityKind) -> String {
        format!("{}:list:*", kind)
    }

    pub fn dashboard() -> &'static str {
        DASHBOARD_CACHE_KEY
    }

    pub fn calendar() -> &'static str {
        CALENDAR_CACHE_KEY
    }
}
