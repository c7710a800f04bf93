//! In-memory broker link for exercising bridges without a broker.
//!
//! [`MockLink`] records every connection and acknowledged publish, and can be
//! scripted to refuse or stall connections, fail individual publishes,
//! delay acknowledgements, or drop an established connection.
//!
//! Only built for this crate's tests and with the `test-util` feature.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;

use crate::error::{BridgeError, Result};
use crate::link::BrokerLink;

/// A message acknowledged by the mock broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: String,
    pub retain: bool,
}

/// Everything that happened on a [`MockLink`], in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Connected,
    ConnectFailed,
    Published(PublishedMessage),
    PublishFailed { topic: String },
    ConnectionLost,
    Disconnected,
}

#[derive(Debug, Default)]
struct MockState {
    connected: bool,
    events: Vec<LinkEvent>,
    connect_attempts: usize,
    failing_connects: usize,
    reject_connects: bool,
    publish_attempts: usize,
    failing_publishes: HashSet<usize>,
    connect_delay: Option<Duration>,
    ack_delay: Option<Duration>,
}

/// Scriptable [`BrokerLink`]. Clones share state, so a test can keep one
/// clone for inspection while the publisher owns another.
#[derive(Debug, Clone, Default)]
pub struct MockLink {
    state: Arc<Mutex<MockState>>,
    lost: Arc<Notify>,
}

impl MockLink {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fail the next `count` connection attempts.
    pub fn fail_next_connects(&self, count: usize) -> &Self {
        self.state().failing_connects += count;
        self
    }

    /// Refuse all further connection attempts as unauthorized.
    pub fn reject_connects(&self) -> &Self {
        self.state().reject_connects = true;
        self
    }

    /// Fail the publish attempt with the given 1-based sequence number,
    /// dropping the connection.
    pub fn fail_publish(&self, attempt: usize) -> &Self {
        self.state().failing_publishes.insert(attempt);
        self
    }

    /// Delay every connection handshake by `delay`, as an unresponsive
    /// broker would.
    pub fn delay_connects(&self, delay: Duration) -> &Self {
        self.state().connect_delay = Some(delay);
        self
    }

    /// Delay every acknowledgement by `delay`.
    pub fn delay_acks(&self, delay: Duration) -> &Self {
        self.state().ack_delay = Some(delay);
        self
    }

    /// Drop the established connection, waking a pending `run_until_lost`.
    pub fn lose_connection(&self) {
        self.lost.notify_one();
    }

    pub fn is_connected(&self) -> bool {
        self.state().connected
    }

    pub fn connect_attempts(&self) -> usize {
        self.state().connect_attempts
    }

    pub fn events(&self) -> Vec<LinkEvent> {
        self.state().events.clone()
    }

    /// Acknowledged publishes, in order.
    pub fn published(&self) -> Vec<PublishedMessage> {
        self.state()
            .events
            .iter()
            .filter_map(|event| match event {
                LinkEvent::Published(message) => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of successful connections.
    pub fn connections(&self) -> usize {
        self.state()
            .events
            .iter()
            .filter(|event| matches!(event, LinkEvent::Connected))
            .count()
    }
}

impl BrokerLink for MockLink {
    async fn connect(&mut self) -> Result<()> {
        let delay = {
            let mut state = self.state();
            state.connect_attempts += 1;
            state.connected = false;
            state.connect_delay
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state();

        if state.reject_connects {
            state.events.push(LinkEvent::ConnectFailed);
            return Err(BridgeError::Rejected("NotAuthorized".to_string()));
        }
        if state.failing_connects > 0 {
            state.failing_connects -= 1;
            state.events.push(LinkEvent::ConnectFailed);
            return Err(BridgeError::Connect("connection refused".to_string()));
        }

        state.connected = true;
        state.events.push(LinkEvent::Connected);
        Ok(())
    }

    async fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> Result<()> {
        let (attempt, delay) = {
            let mut state = self.state();
            if !state.connected {
                return Err(BridgeError::NotConnected);
            }
            state.publish_attempts += 1;
            (state.publish_attempts, state.ack_delay)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state();
        if state.failing_publishes.remove(&attempt) {
            state.connected = false;
            state.events.push(LinkEvent::PublishFailed {
                topic: topic.to_string(),
            });
            return Err(BridgeError::ConnectionLost("connection reset".to_string()));
        }

        state.events.push(LinkEvent::Published(PublishedMessage {
            topic: topic.to_string(),
            payload: String::from_utf8_lossy(payload).into_owned(),
            retain,
        }));
        Ok(())
    }

    async fn run_until_lost(&mut self) -> BridgeError {
        if !self.is_connected() {
            return std::future::pending().await;
        }

        self.lost.notified().await;

        let mut state = self.state();
        state.connected = false;
        state.events.push(LinkEvent::ConnectionLost);
        BridgeError::ConnectionLost("connection reset".to_string())
    }

    async fn disconnect(&mut self) -> Result<()> {
        let mut state = self.state();
        if state.connected {
            state.connected = false;
            state.events.push(LinkEvent::Disconnected);
        }
        Ok(())
    }

    fn abort(&mut self) {
        self.state().connected = false;
    }
}
