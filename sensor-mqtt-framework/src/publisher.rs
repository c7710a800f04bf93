//! Deadline-bounded MQTT publisher.

use std::time::Duration;

use tokio::time::{Instant, timeout};

use crate::MqttConfig;
use crate::error::{BridgeError, Result};
use crate::link::BrokerLink;

/// Lifecycle of the broker connection, owned by the [`Publisher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection and none wanted.
    Disconnected,
    /// First connection attempt in progress.
    Connecting,
    /// Broker accepted the connection.
    Connected,
    /// A connection failed or dropped; a new attempt is due.
    Reconnecting,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Reconnecting => write!(f, "reconnecting"),
        }
    }
}

/// Broker acknowledgement of a publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    /// Time between handing the message to the link and the acknowledgement.
    pub latency: Duration,
}

/// Publisher for sending messages to the broker.
///
/// Wraps a [`BrokerLink`] and puts a deadline on every operation: `connect`
/// fails after the connect timeout, `publish` after the publish timeout.
/// Any failure leaves the publisher in [`ConnectionState::Reconnecting`].
#[derive(Debug)]
pub struct Publisher<L> {
    link: L,
    state: ConnectionState,
    connect_timeout: Duration,
    publish_timeout: Duration,
}

impl<L: BrokerLink> Publisher<L> {
    /// Create a new publisher.
    pub fn new(link: L, connect_timeout: Duration, publish_timeout: Duration) -> Self {
        Self {
            link,
            state: ConnectionState::Disconnected,
            connect_timeout,
            publish_timeout,
        }
    }

    /// Create a publisher using the timeouts of `config`.
    pub fn with_config(link: L, config: &MqttConfig) -> Self {
        Self::new(link, config.connect_timeout(), config.publish_timeout())
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Establish a connection within the connect timeout.
    pub async fn connect(&mut self) -> Result<()> {
        if self.state != ConnectionState::Reconnecting {
            self.state = ConnectionState::Connecting;
        }

        match timeout(self.connect_timeout, self.link.connect()).await {
            Ok(Ok(())) => {
                self.state = ConnectionState::Connected;
                Ok(())
            }
            Ok(Err(e)) => Err(self.fail(e)),
            Err(_) => Err(self.fail(BridgeError::ConnectTimeout(self.connect_timeout))),
        }
    }

    /// Publish a payload and wait for the broker acknowledgement.
    ///
    /// Resolves within the publish timeout under all circumstances.
    pub async fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> Result<Ack> {
        if self.state != ConnectionState::Connected {
            return Err(BridgeError::NotConnected);
        }

        tracing::debug!(
            topic,
            payload = %String::from_utf8_lossy(payload),
            retain,
            "Publishing"
        );

        let started = Instant::now();
        match timeout(self.publish_timeout, self.link.publish(topic, payload, retain)).await {
            Ok(Ok(())) => Ok(Ack {
                latency: started.elapsed(),
            }),
            Ok(Err(e)) => Err(self.fail(e)),
            Err(_) => Err(self.fail(BridgeError::PublishTimeout {
                topic: topic.to_string(),
                timeout: self.publish_timeout,
            })),
        }
    }

    /// Publish a JSON document.
    pub async fn publish_json<T: serde::Serialize>(
        &mut self,
        topic: &str,
        value: &T,
        retain: bool,
    ) -> Result<Ack> {
        let payload = serde_json::to_vec(value)?;
        self.publish(topic, &payload, retain).await
    }

    /// Resolve once the established connection is lost.
    ///
    /// Keeps the connection serviced while waiting. Pending forever when not
    /// connected, so it can sit in a `select!` next to other work.
    pub async fn wait_for_disconnect(&mut self) -> BridgeError {
        if self.state != ConnectionState::Connected {
            return std::future::pending().await;
        }

        let err = self.link.run_until_lost().await;
        self.fail(err)
    }

    /// Close the connection, bounded by the connect timeout. Best-effort:
    /// errors are logged, and the publisher always ends up disconnected.
    pub async fn disconnect(&mut self) {
        if self.state == ConnectionState::Connected {
            match timeout(self.connect_timeout, self.link.disconnect()).await {
                Ok(Ok(())) => tracing::debug!("Disconnected from MQTT broker"),
                Ok(Err(e)) => tracing::warn!(error = %e, "Error disconnecting from MQTT broker"),
                Err(_) => tracing::warn!("Timed out disconnecting from MQTT broker"),
            }
        }
        self.link.abort();
        self.state = ConnectionState::Disconnected;
    }

    fn fail(&mut self, err: BridgeError) -> BridgeError {
        self.link.abort();
        self.state = ConnectionState::Reconnecting;
        err
    }
}
