//! Runtime and IO layer for the Vigil telemetry pipeline
//!
//! ## Overview
//!
//! This crate wires the pure logic of `vigil-core` to the outside world:
//!
//! ```text
//! MQTT broker → MqttTransport → MessageRouter → WorkerPool
//!                                                   ↓
//!                         IngestService: dedup → rollover → persist
//!                                                   ↓
//!                          daily/weekly rollups → Notifier
//! ```
//!
//! ## Collaborator seams
//!
//! External systems are consumed through traits defined here:
//!
//! - [`Transport`]: the pub/sub wire (rumqttc-backed implementation in
//!   [`mqtt`]).
//! - [`CacheStore`](cache::CacheStore): the shared hash-style hot-state
//!   store.
//! - Row stores in [`store`]: the durable record-per-row storage.
//! - [`Notifier`]: the downstream user-notification sender.
//!
//! In-process implementations of the cache and stores live in [`memory`]
//! for tests and single-node deployments.
//!
//! ## Error policy
//!
//! The pipeline is best-effort telemetry: no error crosses a handler
//! boundary as a panic or retry loop. Transport publishes are fire-and-log,
//! cache failures degrade to misses, and storage failures abandon the fold
//! for that one message; the next message for the device recomputes and
//! self-heals.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod cache;
pub mod executor;
pub mod ingest;
pub mod memory;
pub mod router;
pub mod store;

#[cfg(feature = "mqtt")]
pub mod mqtt;

// Re-export common types
pub use ingest::{IngestHandler, IngestService};
pub use router::{MessageHandler, MessageRouter};

use thiserror::Error;
use vigil_core::notify::Category;

/// Common connector errors.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// Transport is not connected
    #[error("not connected")]
    NotConnected,

    /// Operation timed out
    #[error("timeout")]
    Timeout,

    /// Wire-level transport failure
    #[error("transport error: {0}")]
    Transport(String),

    /// Durable store failure
    #[error("storage error: {0}")]
    Storage(String),

    /// Hot-state cache failure (degraded to a miss by callers)
    #[error("cache error: {0}")]
    Cache(String),

    /// Notification sender failure
    #[error("notify error: {0}")]
    Notify(String),

    /// The worker pool is no longer accepting tasks
    #[error("shutting down")]
    ShuttingDown,
}

/// Result alias for connector operations.
pub type ConnectorResult<T> = Result<T, ConnectorError>;

/// Pub/sub transport client.
///
/// Wildcard subscription at the wire level must agree with
/// [`vigil_core::topic::matches`], since the router replays its pattern
/// table to the transport on reconnect.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Publish a payload to a topic. Best-effort: callers log failures and
    /// continue.
    async fn publish(&self, topic: &str, payload: &[u8]) -> ConnectorResult<()>;

    /// Register a wire-level subscription for a pattern.
    async fn subscribe(&self, pattern: &str) -> ConnectorResult<()>;

    /// Remove a wire-level subscription.
    async fn unsubscribe(&self, pattern: &str) -> ConnectorResult<()>;

    /// Whether the transport currently holds a connection.
    fn is_connected(&self) -> bool;
}

/// Downstream user-notification sender (SMS/WeChat/push, external).
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one notification for a device and category.
    async fn notify(
        &self,
        device_id: &str,
        category: Category,
        payload: serde_json::Value,
    ) -> ConnectorResult<()>;
}
