//! Configuration traits and utilities.

use std::path::Path;

use serde::de::DeserializeOwned;

use crate::error::{BridgeError, Result};
use crate::{LoggingConfig, MqttConfig};

/// Configuration of a bridge process.
///
/// A bridge's config file carries at least an `mqtt` and a `logging`
/// section; everything else is bridge specific.
pub trait BridgeConfig: Sized + DeserializeOwned {
    /// Get the MQTT connection configuration.
    fn mqtt(&self) -> &MqttConfig;

    /// Get the logging configuration.
    fn logging(&self) -> &LoggingConfig;

    /// Validate the configuration.
    ///
    /// Called automatically after loading. The default checks the MQTT
    /// section; overrides should call [`MqttConfig::validate`] as well.
    fn validate(&self) -> Result<()> {
        self.mqtt().validate()?;
        Ok(())
    }

    /// Load configuration from a file path.
    ///
    /// Supports JSON5 format. Calls [`validate`](Self::validate) after loading.
    fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(BridgeError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(path)?;
        let config: Self = json5::from_str(&content)?;

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use serde::Deserialize;

    use super::*;

    /// A bridge with one extra setting that needs its own validation.
    #[derive(Debug, Deserialize)]
    struct GatewayConfig {
        mqtt: MqttConfig,
        #[serde(default)]
        logging: LoggingConfig,
        #[serde(default)]
        receivers: Vec<String>,
    }

    impl BridgeConfig for GatewayConfig {
        fn mqtt(&self) -> &MqttConfig {
            &self.mqtt
        }

        fn logging(&self) -> &LoggingConfig {
            &self.logging
        }

        fn validate(&self) -> Result<()> {
            self.mqtt.validate()?;
            if self.receivers.iter().any(String::is_empty) {
                return Err(BridgeError::validation("receiver names must not be empty"));
            }
            Ok(())
        }
    }

    /// A config file under the temp dir, removed on drop.
    struct ConfigFile(PathBuf);

    impl ConfigFile {
        fn new(name: &str, content: &str) -> Self {
            let path = std::env::temp_dir().join(format!("{}-{}.json5", name, std::process::id()));
            std::fs::write(&path, content).unwrap();
            Self(path)
        }
    }

    impl Drop for ConfigFile {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.0);
        }
    }

    #[test]
    fn test_missing_file() {
        let err = GatewayConfig::load("/nonexistent/gateway.json5").unwrap_err();
        assert!(matches!(err, BridgeError::ConfigNotFound { path } if path.ends_with("gateway.json5")));
    }

    #[test]
    fn test_load_json5() {
        let file = ConfigFile::new(
            "framework-config-json5",
            r#"{
                // comments and trailing commas are fine
                mqtt: { host: "mqtt-broker.local", port: 1883, disable_tls: true, },
                receivers: ["attic"],
            }"#,
        );
        let config = GatewayConfig::load(&file.0).unwrap();

        assert_eq!(config.mqtt().port(), 1883);
        assert_eq!(config.logging().level, "info");
        assert_eq!(config.receivers, vec!["attic"]);
    }

    #[test]
    fn test_load_runs_mqtt_validation() {
        let file = ConfigFile::new(
            "framework-config-password",
            r#"{ mqtt: { host: "mqtt-broker.local", password: "secret" } }"#,
        );
        let err = GatewayConfig::load(&file.0).unwrap_err();
        assert!(matches!(err, BridgeError::ConfigValidation(msg) if msg.contains("username")));
    }

    #[test]
    fn test_load_runs_bridge_validation() {
        let file = ConfigFile::new(
            "framework-config-receivers",
            r#"{ mqtt: { host: "mqtt-broker.local" }, receivers: ["attic", ""] }"#,
        );
        let err = GatewayConfig::load(&file.0).unwrap_err();
        assert!(matches!(err, BridgeError::ConfigValidation(msg) if msg.contains("receiver")));
    }

    #[test]
    fn test_load_parse_error() {
        let file = ConfigFile::new("framework-config-truncated", "{ mqtt: ");
        let err = GatewayConfig::load(&file.0).unwrap_err();
        assert!(matches!(err, BridgeError::ConfigParse(_)));
    }
}
