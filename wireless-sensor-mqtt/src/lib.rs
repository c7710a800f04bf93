//! MQTT client reporting measurements of FT017TH wireless thermo/hygrometers.
//!
//! Temperature and relative humidity are published to
//! `{topic_prefix}/temperature-degrees-celsius` and
//! `{topic_prefix}/relative-humidity-percent`. Both sensors are announced to
//! Home Assistant via MQTT discovery after every (re)connect.

pub mod bridge;
pub mod config;
pub mod discovery;
pub mod source;
pub mod watchdog;

pub use bridge::{Bridge, BridgeExit};
pub use config::WirelessSensorBridgeConfig;
pub use discovery::DiscoveryAnnouncer;
pub use source::{MeasurementSource, SensorSource, SourceError};
pub use watchdog::Watchdog;
