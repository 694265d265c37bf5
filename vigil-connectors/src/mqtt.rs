//! MQTT transport backed by rumqttc
//!
//! ## Overview
//!
//! Two halves, split the way rumqttc splits its client:
//!
//! - [`MqttTransport`] wraps the `AsyncClient` and implements the
//!   [`Transport`] seam (publish/subscribe/unsubscribe).
//! - [`MqttDriver`] owns the event loop: it feeds delivered messages into
//!   the router, tracks connection state, and replays the router's
//!   subscription table after every reconnect (the broker forgets
//!   session subscriptions, the router does not).
//!
//! Reconnect backoff and TLS are rumqttc's concern; the driver only
//! pauses briefly after a connection error so a dead broker does not spin
//! the loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::sync::watch;

use crate::router::MessageRouter;
use crate::{ConnectorError, ConnectorResult, Transport};

/// MQTT connection configuration.
#[derive(Clone)]
pub struct MqttConfig {
    /// Broker host
    pub host: String,
    /// Broker port
    pub port: u16,
    /// Client identifier
    pub client_id: String,
    /// Keep-alive interval
    pub keep_alive: Duration,
    /// Client-side request queue capacity
    pub queue_capacity: usize,
    /// Optional username/password
    pub credentials: Option<(String, String)>,
}

impl MqttConfig {
    /// Configuration for a broker at `host:port`.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            client_id: "vigil-ingest".to_owned(),
            keep_alive: Duration::from_secs(30),
            queue_capacity: 64,
            credentials: None,
        }
    }

    /// Set the client identifier.
    pub fn client_id(mut self, id: impl Into<String>) -> Self {
        self.client_id = id.into();
        self
    }

    /// Set the keep-alive interval in seconds.
    pub fn keep_alive_secs(mut self, secs: u64) -> Self {
        self.keep_alive = Duration::from_secs(secs);
        self
    }

    /// Set username/password credentials.
    pub fn credentials(mut self, user: impl Into<String>, pass: impl Into<String>) -> Self {
        self.credentials = Some((user.into(), pass.into()));
        self
    }
}

/// Transport seam over the rumqttc async client.
pub struct MqttTransport {
    client: AsyncClient,
    connected: AtomicBool,
}

impl MqttTransport {
    /// Build the client and its driver from a configuration.
    pub fn connect(config: MqttConfig) -> (Arc<Self>, MqttDriver) {
        let mut options = MqttOptions::new(config.client_id, config.host, config.port);
        options.set_keep_alive(config.keep_alive);
        if let Some((user, pass)) = config.credentials {
            options.set_credentials(user, pass);
        }

        let (client, event_loop) = AsyncClient::new(options, config.queue_capacity);
        let transport = Arc::new(Self {
            client,
            connected: AtomicBool::new(false),
        });

        let driver = MqttDriver {
            event_loop,
            transport: transport.clone(),
        };
        (transport, driver)
    }

    fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl Transport for MqttTransport {
    async fn publish(&self, topic: &str, payload: &[u8]) -> ConnectorResult<()> {
        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload.to_vec())
            .await
            .map_err(|err| ConnectorError::Transport(err.to_string()))
    }

    async fn subscribe(&self, pattern: &str) -> ConnectorResult<()> {
        self.client
            .subscribe(pattern, QoS::AtLeastOnce)
            .await
            .map_err(|err| ConnectorError::Transport(err.to_string()))
    }

    async fn unsubscribe(&self, pattern: &str) -> ConnectorResult<()> {
        self.client
            .unsubscribe(pattern)
            .await
            .map_err(|err| ConnectorError::Transport(err.to_string()))
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// Drives the rumqttc event loop and feeds the router.
pub struct MqttDriver {
    event_loop: EventLoop,
    transport: Arc<MqttTransport>,
}

impl MqttDriver {
    /// Pause after a connection error before polling again.
    const ERROR_BACKOFF: Duration = Duration::from_secs(1);

    /// Run until the shutdown signal flips to true.
    ///
    /// The router's handlers execute on this task, so they must only
    /// decode and enqueue; protocol keep-alive depends on this loop
    /// returning to poll promptly.
    pub async fn run(mut self, router: Arc<MessageRouter>, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        log::info!("mqtt driver stopping");
                        self.transport.set_connected(false);
                        return;
                    }
                }
                event = self.event_loop.poll() => match event {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        log::info!("mqtt connected");
                        self.transport.set_connected(true);
                        if let Err(err) = router.replay_subscriptions().await {
                            log::warn!("subscription replay failed: {err}");
                        }
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        router.dispatch(&publish.topic, &publish.payload).await;
                    }
                    Ok(_) => {}
                    Err(err) => {
                        log::warn!("mqtt connection error: {err}");
                        self.transport.set_connected(false);
                        tokio::time::sleep(Self::ERROR_BACKOFF).await;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_builder() {
        let config = MqttConfig::new("broker.local", 1883)
            .client_id("vigil-test")
            .keep_alive_secs(15)
            .credentials("user", "pass");

        assert_eq!(config.host, "broker.local");
        assert_eq!(config.port, 1883);
        assert_eq!(config.client_id, "vigil-test");
        assert_eq!(config.keep_alive, Duration::from_secs(15));
        assert!(config.credentials.is_some());
    }

    #[test]
    fn transport_starts_disconnected() {
        let (transport, _driver) = MqttTransport::connect(MqttConfig::new("localhost", 1883));
        assert!(!transport.is_connected());
    }
}
