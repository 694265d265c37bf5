//! Device hot-state cache
//!
//! The cache keeps the most recently computed record per (record class,
//! device) in an external hash-style store that survives process restarts
//! and is shared across instances. It serves two jobs: the dedup baseline
//! without a storage round-trip on every message, and state carry-over
//! across restarts.
//!
//! Entries are written unconditionally with a short TTL on every message
//! (even non-novel ones) so the cache stays warm while durable storage
//! only sees meaningful changes. Cache failures are never fatal: a read
//! error degrades to a miss and the caller falls back to the durable
//! store.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::ConnectorResult;

/// Record class key for attribute snapshots.
pub const CLASS_ATTRIBUTE: &str = "attr";
/// Record class key for event records.
pub const CLASS_EVENT: &str = "event";

/// External hash-style key/value store with per-entry expiry.
#[async_trait::async_trait]
pub trait CacheStore: Send + Sync {
    /// Read a field from a key, `None` when absent or expired.
    async fn get(&self, key: &str, field: &str) -> ConnectorResult<Option<String>>;

    /// Write a field under a key with a time-to-live.
    async fn put(
        &self,
        key: &str,
        field: &str,
        value: String,
        ttl: Duration,
    ) -> ConnectorResult<()>;
}

/// Typed wrapper over the cache store, keyed by (class, device id).
#[derive(Clone)]
pub struct DeviceStateCache {
    store: Arc<dyn CacheStore>,
    ttl: Duration,
}

impl DeviceStateCache {
    /// TTL keeping the cache warm between device messages without letting
    /// stale state outlive a quiet device for long.
    pub const DEFAULT_TTL: Duration = Duration::from_secs(120);

    /// Wrap a cache store with the default TTL.
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self::with_ttl(store, Self::DEFAULT_TTL)
    }

    /// Wrap a cache store with a custom TTL.
    pub fn with_ttl(store: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Fetch the cached record for a device, or `None` on miss.
    ///
    /// Store and decode errors are logged and degrade to a miss.
    pub async fn get<T: DeserializeOwned>(&self, class: &str, device_id: &str) -> Option<T> {
        let raw = match self.store.get(class, device_id).await {
            Ok(raw) => raw?,
            Err(err) => {
                log::warn!("cache get {class}/{device_id} failed: {err}");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(err) => {
                log::warn!("cache entry {class}/{device_id} undecodable: {err}");
                None
            }
        }
    }

    /// Refresh the cached record for a device.
    ///
    /// Failures are logged and swallowed; the durable store remains the
    /// source of truth.
    pub async fn put<T: Serialize>(&self, class: &str, device_id: &str, record: &T) {
        let raw = match serde_json::to_string(record) {
            Ok(raw) => raw,
            Err(err) => {
                log::warn!("cache encode {class}/{device_id} failed: {err}");
                return;
            }
        };

        if let Err(err) = self
            .store
            .put(class, device_id, raw, self.ttl)
            .await
        {
            log::warn!("cache put {class}/{device_id} failed: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryCache;
    use crate::ConnectorError;
    use vigil_core::AttributeSnapshot;

    struct FailingStore;

    #[async_trait::async_trait]
    impl CacheStore for FailingStore {
        async fn get(&self, _key: &str, _field: &str) -> ConnectorResult<Option<String>> {
            Err(ConnectorError::Cache("down".into()))
        }

        async fn put(
            &self,
            _key: &str,
            _field: &str,
            _value: String,
            _ttl: Duration,
        ) -> ConnectorResult<()> {
            Err(ConnectorError::Cache("down".into()))
        }
    }

    #[tokio::test]
    async fn round_trips_typed_records() {
        let cache = DeviceStateCache::new(Arc::new(MemoryCache::new()));
        let snap = AttributeSnapshot::seed("mac1", 1000);

        cache.put(CLASS_ATTRIBUTE, "mac1", &snap).await;
        let back: Option<AttributeSnapshot> = cache.get(CLASS_ATTRIBUTE, "mac1").await;
        assert_eq!(back, Some(snap));

        let miss: Option<AttributeSnapshot> = cache.get(CLASS_EVENT, "mac1").await;
        assert!(miss.is_none());
    }

    #[tokio::test]
    async fn store_errors_degrade_to_miss() {
        let cache = DeviceStateCache::new(Arc::new(FailingStore));
        let snap = AttributeSnapshot::seed("mac1", 1000);

        // Neither call may fail outward
        cache.put(CLASS_ATTRIBUTE, "mac1", &snap).await;
        let back: Option<AttributeSnapshot> = cache.get(CLASS_ATTRIBUTE, "mac1").await;
        assert!(back.is_none());
    }
}
