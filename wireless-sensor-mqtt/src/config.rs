//! Configuration for the wireless sensor bridge.

use std::time::Duration;

use sensor_mqtt_common::{DISCOVERY_PREFIX, NODE_ID_ALLOWED_CHARS, is_valid_node_id};
use serde::{Deserialize, Serialize};
use sensor_mqtt_framework::{
    BridgeConfig, BridgeError, LoggingConfig, MqttConfig, Result, TopicSet,
};

/// Complete bridge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WirelessSensorBridgeConfig {
    /// MQTT broker settings.
    pub mqtt: MqttConfig,

    /// Home Assistant discovery settings.
    #[serde(default)]
    pub homeassistant: HomeAssistantConfig,

    /// Sensor receiver settings.
    #[serde(default)]
    pub sensor: SensorConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Home Assistant MQTT discovery configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HomeAssistantConfig {
    /// Discovery topic prefix (default: "homeassistant").
    #[serde(default = "default_discovery_prefix")]
    pub discovery_prefix: String,

    /// Node id used in discovery topics and unique ids (default: "FT017TH").
    #[serde(default = "default_node_id")]
    pub node_id: String,
}

fn default_discovery_prefix() -> String {
    DISCOVERY_PREFIX.to_string()
}

fn default_node_id() -> String {
    "FT017TH".to_string()
}

impl Default for HomeAssistantConfig {
    fn default() -> Self {
        Self {
            discovery_prefix: default_discovery_prefix(),
            node_id: default_node_id(),
        }
    }
}

/// Sensor receiver configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorConfig {
    /// Publish a few random values instead of reading the sensor.
    #[serde(default)]
    pub mock_measurements: bool,

    /// Receiver driver command and arguments. The driver prints one JSON
    /// object per decoded packet on stdout.
    #[serde(default)]
    pub driver_command: Vec<String>,

    /// Exit if no valid packet arrived for this long (default: 3600).
    #[serde(default = "default_stall_timeout")]
    pub stall_timeout_secs: u64,
}

fn default_stall_timeout() -> u64 {
    60 * 60
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            mock_measurements: false,
            driver_command: Vec::new(),
            stall_timeout_secs: default_stall_timeout(),
        }
    }
}

impl SensorConfig {
    pub fn stall_timeout(&self) -> Duration {
        Duration::from_secs(self.stall_timeout_secs)
    }

    /// Check that some measurement source is selected. Run after command line
    /// overrides are applied.
    pub fn require_source(&self) -> Result<()> {
        if !self.mock_measurements && self.driver_command.is_empty() {
            return Err(BridgeError::validation(
                "no sensor driver configured (set sensor.driver_command or use --mock-measurements)",
            ));
        }
        Ok(())
    }
}

impl WirelessSensorBridgeConfig {
    /// Topics derived from the MQTT and discovery settings.
    pub fn topics(&self) -> Result<TopicSet> {
        Ok(TopicSet::new(
            &self.mqtt.topic_prefix,
            &self.homeassistant.discovery_prefix,
            &self.homeassistant.node_id,
        )?)
    }
}

impl BridgeConfig for WirelessSensorBridgeConfig {
    fn mqtt(&self) -> &MqttConfig {
        &self.mqtt
    }

    fn logging(&self) -> &LoggingConfig {
        &self.logging
    }

    fn validate(&self) -> Result<()> {
        self.mqtt.validate()?;

        if !is_valid_node_id(&self.homeassistant.node_id) {
            return Err(BridgeError::validation(format!(
                "invalid home assistant node id '{}' (length >= 1, allowed characters: {})",
                self.homeassistant.node_id, NODE_ID_ALLOWED_CHARS
            )));
        }

        if self.homeassistant.discovery_prefix.is_empty() {
            return Err(BridgeError::validation(
                "homeassistant.discovery_prefix must not be empty",
            ));
        }

        if self.sensor.stall_timeout_secs == 0 {
            return Err(BridgeError::validation(
                "sensor.stall_timeout_secs must be > 0",
            ));
        }

        if self
            .sensor
            .driver_command
            .first()
            .is_some_and(|program| program.is_empty())
        {
            return Err(BridgeError::validation(
                "sensor.driver_command must start with a program",
            ));
        }

        Ok(())
    }
}
