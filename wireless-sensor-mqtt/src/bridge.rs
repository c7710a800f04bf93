//! The bridge loop: measurements in, MQTT messages out.
//!
//! The loop is a small phase machine:
//!
//! ```text
//! Connect ──► Announce ──► Receive ─┐
//!    ▲                        │  ▲  │
//!    └──── connection lost ───┘  └──┘
//! ```
//!
//! Every phase checks the stall watchdog, and every exit path disconnects
//! from the broker and closes the source.

use std::future::Future;
use std::pin::Pin;

use tokio::time::sleep_until;

use sensor_mqtt_common::{Channel, Measurement, TopicSet};
use sensor_mqtt_framework::{Backoff, BrokerLink, Publisher, Result};

use crate::config::WirelessSensorBridgeConfig;
use crate::discovery::DiscoveryAnnouncer;
use crate::source::{MeasurementSource, SourceError};
use crate::watchdog::Watchdog;

/// Why the bridge stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeExit {
    /// Shutdown was requested.
    Shutdown,
    /// No valid measurement within the stall timeout.
    Stalled,
    /// The measurement source failed.
    SourceFault(String),
    /// The broker refused the connection for good.
    BrokerFatal(String),
}

impl BridgeExit {
    /// Process exit code for this reason.
    pub fn exit_code(&self) -> u8 {
        match self {
            BridgeExit::Shutdown => 0,
            BridgeExit::Stalled => 2,
            BridgeExit::SourceFault(_) => 3,
            BridgeExit::BrokerFatal(_) => 4,
        }
    }
}

impl From<SourceError> for BridgeExit {
    /// Exit reason for a source error that ends the bridge. A finite source
    /// running dry means no more packets will arrive.
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::Exhausted => BridgeExit::Stalled,
            SourceError::Decode(reason) | SourceError::Fault(reason) => {
                BridgeExit::SourceFault(reason)
            }
        }
    }
}

impl std::fmt::Display for BridgeExit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BridgeExit::Shutdown => write!(f, "shutdown requested"),
            BridgeExit::Stalled => write!(f, "timeout waiting for packet"),
            BridgeExit::SourceFault(reason) => write!(f, "sensor fault: {}", reason),
            BridgeExit::BrokerFatal(reason) => write!(f, "broker refused connection: {}", reason),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Connect,
    Announce,
    Receive,
}

/// Outcome of a phase that did not end the bridge.
type Step = std::result::Result<Phase, BridgeExit>;

/// Moves measurements from a source to the broker.
pub struct Bridge<L, S> {
    source: S,
    publisher: Publisher<L>,
    announcer: DiscoveryAnnouncer,
    topics: TopicSet,
    watchdog: Watchdog,
    backoff: Backoff,
}

impl<L: BrokerLink, S: MeasurementSource> Bridge<L, S> {
    pub fn new(
        source: S,
        publisher: Publisher<L>,
        announcer: DiscoveryAnnouncer,
        topics: TopicSet,
        watchdog: Watchdog,
        backoff: Backoff,
    ) -> Self {
        Self {
            source,
            publisher,
            announcer,
            topics,
            watchdog,
            backoff,
        }
    }

    /// Build a bridge from configuration. The watchdog starts now.
    pub fn from_config(
        config: &WirelessSensorBridgeConfig,
        source: S,
        publisher: Publisher<L>,
    ) -> Result<Self> {
        let topics = config.topics()?;
        let announcer = DiscoveryAnnouncer::new(&topics, &config.homeassistant.node_id)?;
        Ok(Self::new(
            source,
            publisher,
            announcer,
            topics,
            Watchdog::new(config.sensor.stall_timeout()),
            Backoff::from_config(&config.mqtt.reconnect),
        ))
    }

    /// Run until a fatal condition or until `shutdown` resolves.
    pub async fn run<F: Future<Output = ()>>(mut self, shutdown: F) -> BridgeExit {
        tokio::pin!(shutdown);

        let exit = self.run_phases(shutdown).await;

        self.publisher.disconnect().await;
        self.source.close().await;

        match &exit {
            BridgeExit::Shutdown => tracing::info!("Bridge stopped"),
            BridgeExit::Stalled => tracing::error!(
                timeout = ?self.watchdog.timeout(),
                "Timeout waiting for packet, exiting"
            ),
            exit => tracing::error!(code = exit.exit_code(), "Bridge failed: {}", exit),
        }
        exit
    }

    async fn run_phases<F: Future<Output = ()>>(
        &mut self,
        mut shutdown: Pin<&mut F>,
    ) -> BridgeExit {
        let mut phase = Phase::Connect;
        loop {
            if self.watchdog.is_expired() {
                return BridgeExit::Stalled;
            }

            let step = match phase {
                Phase::Connect => self.connect(shutdown.as_mut()).await,
                Phase::Announce => self.announce().await,
                Phase::Receive => self.receive(shutdown.as_mut()).await,
            };

            phase = match step {
                Ok(next) => next,
                Err(exit) => return exit,
            };
        }
    }

    /// Connect, retrying with backoff until the broker accepts us.
    async fn connect<F: Future<Output = ()>>(&mut self, mut shutdown: Pin<&mut F>) -> Step {
        loop {
            let result = tokio::select! {
                biased;
                _ = &mut shutdown => return Err(BridgeExit::Shutdown),
                _ = sleep_until(self.watchdog.deadline()) => return Err(BridgeExit::Stalled),
                result = self.publisher.connect() => result,
            };

            match result {
                Ok(()) => {
                    tracing::info!(
                        failed_attempts = self.backoff.attempts(),
                        "Connected to MQTT broker"
                    );
                    self.backoff.reset();
                    return Ok(Phase::Announce);
                }
                Err(e) if e.is_fatal() => return Err(BridgeExit::BrokerFatal(e.to_string())),
                Err(e) => {
                    let delay = self.backoff.next_delay();
                    tracing::warn!(
                        error = %e,
                        attempt = self.backoff.attempts(),
                        retry_in = ?delay,
                        "Failed to connect to MQTT broker"
                    );

                    let retry_at = tokio::time::Instant::now() + delay;
                    tokio::select! {
                        biased;
                        _ = &mut shutdown => return Err(BridgeExit::Shutdown),
                        _ = sleep_until(self.watchdog.deadline()) => {}
                        _ = sleep_until(retry_at) => {}
                    }
                    if self.watchdog.is_expired() {
                        return Err(BridgeExit::Stalled);
                    }
                }
            }
        }
    }

    async fn announce(&mut self) -> Step {
        match self.announcer.announce(&mut self.publisher).await {
            Ok(()) => Ok(Phase::Receive),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to announce sensors, reconnecting");
                Ok(Phase::Connect)
            }
        }
    }

    /// Wait for one event and handle it.
    async fn receive<F: Future<Output = ()>>(&mut self, mut shutdown: Pin<&mut F>) -> Step {
        let next = tokio::select! {
            biased;
            _ = &mut shutdown => return Err(BridgeExit::Shutdown),
            e = self.publisher.wait_for_disconnect() => {
                tracing::warn!(error = %e, "Lost connection to MQTT broker");
                return Ok(Phase::Connect);
            }
            _ = sleep_until(self.watchdog.deadline()) => return Ok(Phase::Receive),
            next = self.source.next_measurement() => next,
        };

        match next {
            Ok(measurement) => {
                tracing::debug!("Received {}", measurement);
                match self.publish_measurement(&measurement).await {
                    Ok(()) => {
                        self.watchdog.reset();
                        Ok(Phase::Receive)
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to publish measurement, dropping it");
                        Ok(Phase::Connect)
                    }
                }
            }
            Err(SourceError::Decode(reason)) => {
                tracing::warn!(reason = %reason, "Failed to decode packet");
                Ok(Phase::Receive)
            }
            Err(SourceError::Exhausted) => {
                tracing::info!("Measurement stream ended");
                Err(BridgeExit::Stalled)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn publish_measurement(&mut self, measurement: &Measurement) -> Result<()> {
        for channel in Channel::ALL {
            self.publisher
                .publish(
                    self.topics.state(channel),
                    measurement.payload(channel).as_bytes(),
                    false,
                )
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(BridgeExit::Shutdown.exit_code(), 0);
        assert_eq!(BridgeExit::Stalled.exit_code(), 2);
        assert_eq!(BridgeExit::SourceFault("gone".to_string()).exit_code(), 3);
        assert_eq!(BridgeExit::BrokerFatal("NotAuthorized".to_string()).exit_code(), 4);
    }

    #[test]
    fn test_exit_from_source_error() {
        assert_eq!(
            BridgeExit::from(SourceError::Fault("no receiver".to_string())),
            BridgeExit::SourceFault("no receiver".to_string())
        );
        assert_eq!(BridgeExit::from(SourceError::Exhausted), BridgeExit::Stalled);
    }

    #[test]
    fn test_exit_display() {
        assert_eq!(BridgeExit::Stalled.to_string(), "timeout waiting for packet");
        assert_eq!(
            BridgeExit::SourceFault("driver exited".to_string()).to_string(),
            "sensor fault: driver exited"
        );
    }
}
