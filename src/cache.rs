//! Fast expiring cache tier.
//!
//! The session store talks to the cache through the [`Cache`] trait so a
//! networked cache can replace the in-process [`MemoryCache`]. Values are
//! opaque strings; each entry carries its own time-to-live.

use std::future::Future;
use std::time::{Duration, Instant};

use moka::Expiry;
use moka::future::Cache as MokaCache;

use crate::error::Result;

/// Key-value cache with per-entry expiry.
pub trait Cache: Send + Sync + 'static {
    /// Fetch a live entry.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>>> + Send;

    /// Insert or replace an entry.
    fn set(
        &self,
        key: &str,
        value: String,
        ttl: Duration,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Insert only when no live entry exists. Returns whether it was inserted.
    fn set_if_absent(
        &self,
        key: &str,
        value: String,
        ttl: Duration,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Remove an entry. Removing a missing key is not an error.
    fn delete(&self, key: &str) -> impl Future<Output = Result<()>> + Send;
}

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    ttl: Duration,
}

/// Expires each entry after its own TTL, restarting it on replacement.
struct PerEntryTtl;

impl Expiry<String, Entry> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        entry: &Entry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        entry: &Entry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }
}

/// In-process cache backed by moka.
#[derive(Clone)]
pub struct MemoryCache {
    inner: MokaCache<String, Entry>,
}

impl std::fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCache")
            .field("entries", &self.inner.entry_count())
            .finish()
    }
}

impl MemoryCache {
    /// Create a cache holding at most `capacity` entries.
    pub fn new(capacity: u64) -> Self {
        Self {
            inner: MokaCache::builder()
                .max_capacity(capacity)
                .expire_after(PerEntryTtl)
                .build(),
        }
    }
}

impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.inner.get(key).await.map(|entry| entry.value))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        self.inner.insert(key.to_string(), Entry { value, ttl }).await;
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: String, ttl: Duration) -> Result<bool> {
        let entry = self
            .inner
            .entry(key.to_string())
            .or_insert(Entry { value, ttl })
            .await;
        Ok(entry.is_fresh())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.inner.invalidate(key).await;
        Ok(())
    }
}
