//! Sensor MQTT Bridge Framework
//!
//! Common abstractions for building bridges that publish sensor readings to
//! an MQTT broker.
//!
//! # Overview
//!
//! This framework provides:
//! - [`BridgeConfig`] trait for configuration loading and validation
//! - [`BridgeRunner`] for process setup (logging, publisher construction)
//! - [`Publisher`] for deadline-bounded publishing with connection state
//! - [`BrokerLink`] as the transport seam, with [`MqttLink`] over `rumqttc`
//! - [`Backoff`] for spacing out reconnect attempts
//! - [`BridgeArgs`] for common CLI argument parsing
//!
//! # Example
//!
//! ```ignore
//! use clap::Parser;
//! use sensor_mqtt_framework::{BridgeArgs, BridgeConfig, BridgeRunner, shutdown_signal};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = BridgeArgs::parse();
//!     let config = MyBridgeConfig::load(&args.config)?;
//!
//!     let runner = BridgeRunner::new_with_args("mybridge", config, Some(&args))?;
//!     let mut publisher = runner.publisher()?;
//!
//!     publisher.connect().await?;
//!     publisher.publish("my/topic", b"42", false).await?;
//!     shutdown_signal().await;
//!     publisher.disconnect().await;
//!     Ok(())
//! }
//! ```

mod args;
mod backoff;
mod config;
mod error;
mod link;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;
mod publisher;
mod runner;

pub use args::BridgeArgs;
pub use backoff::Backoff;
pub use config::BridgeConfig;
pub use error::{BridgeError, Result};
pub use link::{BrokerLink, MqttLink};
pub use publisher::{Ack, ConnectionState, Publisher};
pub use runner::{BridgeRunner, shutdown_signal};

// Re-export commonly used types from sensor-mqtt-common
pub use sensor_mqtt_common::{
    Channel, LogFormat, LoggingConfig, Measurement, MqttConfig, ReconnectConfig, TopicSet,
};
