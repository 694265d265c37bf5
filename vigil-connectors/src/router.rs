//! Message routing from topics to registered handlers
//!
//! The router owns the authoritative pattern → handler table. Incoming
//! (topic, payload) pairs are dispatched with an exact-key lookup first;
//! on a miss, registered patterns are scanned with the positional wildcard
//! matcher and the first match wins (map iteration order is unspecified,
//! so overlapping wildcard patterns have no defined preference).
//!
//! When a transport is bound, subscribe/unsubscribe mirror to wire-level
//! subscriptions, and [`MessageRouter::replay_subscriptions`] re-issues
//! every pattern after a reconnect. The in-memory table stays
//! authoritative throughout. There is no global subscription state: the
//! router is constructed and injected at the composition root.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use vigil_core::topic;

use crate::{ConnectorResult, Transport};

/// Handler invoked for messages whose topic matched a registered pattern.
///
/// Handlers run on the transport's delivery task and must return quickly;
/// slow work belongs on the worker pool.
#[async_trait::async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handle one delivered message.
    async fn handle(&self, topic: &str, payload: &[u8]);
}

/// Pattern → handler dispatch table with optional wire mirroring.
#[derive(Default)]
pub struct MessageRouter {
    handlers: RwLock<HashMap<String, Arc<dyn MessageHandler>>>,
    transport: RwLock<Option<Arc<dyn Transport>>>,
}

impl MessageRouter {
    /// Create an empty router.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind the transport that wire subscriptions mirror to.
    pub fn bind_transport(&self, transport: Arc<dyn Transport>) {
        *self.transport.write().expect("router transport lock") = Some(transport);
    }

    fn transport(&self) -> Option<Arc<dyn Transport>> {
        self.transport.read().expect("router transport lock").clone()
    }

    /// Register a handler for a pattern.
    ///
    /// Replaces any previous handler for the same pattern. The wire
    /// subscription is best-effort: a transport failure is logged and the
    /// in-memory registration stands (it is replayed on reconnect).
    pub async fn subscribe(&self, pattern: &str, handler: Arc<dyn MessageHandler>) {
        self.handlers
            .write()
            .expect("router handler lock")
            .insert(pattern.to_owned(), handler);
        log::debug!("subscribed pattern {pattern}");

        if let Some(transport) = self.transport() {
            if let Err(err) = transport.subscribe(pattern).await {
                log::warn!("wire subscribe failed for {pattern}: {err}");
            }
        }
    }

    /// Remove a pattern registration. Returns whether it existed.
    pub async fn unsubscribe(&self, pattern: &str) -> bool {
        let existed = self
            .handlers
            .write()
            .expect("router handler lock")
            .remove(pattern)
            .is_some();

        if existed {
            log::debug!("unsubscribed pattern {pattern}");
            if let Some(transport) = self.transport() {
                if let Err(err) = transport.unsubscribe(pattern).await {
                    log::warn!("wire unsubscribe failed for {pattern}: {err}");
                }
            }
        }
        existed
    }

    /// Re-issue every registered pattern to the transport.
    ///
    /// Called after a reconnect, when the broker has forgotten the
    /// session's subscriptions.
    pub async fn replay_subscriptions(&self) -> ConnectorResult<()> {
        let Some(transport) = self.transport() else {
            return Ok(());
        };

        let patterns: Vec<String> = self
            .handlers
            .read()
            .expect("router handler lock")
            .keys()
            .cloned()
            .collect();

        log::info!("replaying {} subscriptions", patterns.len());
        for pattern in patterns {
            transport.subscribe(&pattern).await?;
        }
        Ok(())
    }

    /// Dispatch a message to the first matching handler.
    ///
    /// Returns whether any handler was invoked.
    pub async fn dispatch(&self, topic: &str, payload: &[u8]) -> bool {
        let handler = {
            let handlers = self.handlers.read().expect("router handler lock");
            handlers.get(topic).cloned().or_else(|| {
                handlers
                    .iter()
                    .find(|(pattern, _)| topic::matches(pattern, topic))
                    .map(|(_, handler)| handler.clone())
            })
        };

        match handler {
            Some(handler) => {
                handler.handle(topic, payload).await;
                true
            }
            None => {
                log::trace!("no handler for topic {topic}");
                false
            }
        }
    }

    /// Number of registered patterns.
    pub fn len(&self) -> usize {
        self.handlers.read().expect("router handler lock").len()
    }

    /// Whether no patterns are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Recording {
        hits: AtomicUsize,
    }

    impl Recording {
        fn new() -> Arc<Self> {
            Arc::new(Self { hits: AtomicUsize::new(0) })
        }

        fn hits(&self) -> usize {
            self.hits.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl MessageHandler for Recording {
        async fn handle(&self, _topic: &str, _payload: &[u8]) {
            self.hits.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn exact_match_takes_priority() {
        let router = MessageRouter::new();
        let exact = Recording::new();
        let wild = Recording::new();

        router.subscribe("device/mac1/state", exact.clone()).await;
        router.subscribe("device/+/state", wild.clone()).await;

        assert!(router.dispatch("device/mac1/state", b"{}").await);
        assert_eq!(exact.hits(), 1);
        assert_eq!(wild.hits(), 0);
    }

    #[tokio::test]
    async fn wildcard_match_on_exact_miss() {
        let router = MessageRouter::new();
        let wild = Recording::new();
        router.subscribe("device/+/state", wild.clone()).await;

        assert!(router.dispatch("device/mac2/state", b"{}").await);
        assert_eq!(wild.hits(), 1);

        // Unequal segment count never matches
        assert!(!router.dispatch("device/mac2/state/extra", b"{}").await);
        assert_eq!(wild.hits(), 1);
    }

    #[tokio::test]
    async fn unsubscribe_stops_dispatch() {
        let router = MessageRouter::new();
        let handler = Recording::new();
        router.subscribe("device/+/state", handler.clone()).await;

        assert!(router.unsubscribe("device/+/state").await);
        assert!(!router.unsubscribe("device/+/state").await);
        assert!(!router.dispatch("device/mac1/state", b"{}").await);
        assert_eq!(handler.hits(), 0);
    }
}
