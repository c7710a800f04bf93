use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Default MQTT port for plain TCP connections.
pub const MQTT_DEFAULT_PORT: u16 = 1883;

/// Default MQTT port for TLS connections.
pub const MQTT_DEFAULT_TLS_PORT: u16 = 8883;

/// MQTT broker connection configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MqttConfig {
    /// Broker hostname or address.
    pub host: String,

    /// Broker port. Defaults to 8883, or 1883 when TLS is disabled.
    #[serde(default)]
    pub port: Option<u16>,

    /// Connect without TLS.
    #[serde(default)]
    pub disable_tls: bool,

    /// CA certificate (PEM) used instead of the system roots.
    #[serde(default)]
    pub ca_file: Option<PathBuf>,

    /// Username for broker authentication.
    #[serde(default)]
    pub username: Option<String>,

    /// Password for broker authentication.
    #[serde(default)]
    pub password: Option<String>,

    /// File holding the password. A single trailing newline is stripped.
    #[serde(default)]
    pub password_file: Option<PathBuf>,

    /// MQTT client identifier.
    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// Topic prefix for measurement values.
    #[serde(default = "default_topic_prefix")]
    pub topic_prefix: String,

    /// Keep-alive interval in seconds.
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,

    /// Upper bound for establishing a connection, in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Upper bound for a broker acknowledgement of a publish, in seconds.
    #[serde(default = "default_publish_timeout")]
    pub publish_timeout_secs: u64,

    /// Delay policy between reconnect attempts.
    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

fn default_client_id() -> String {
    "wireless-sensor-mqtt".to_string()
}

fn default_topic_prefix() -> String {
    "wireless-sensor/FT017TH".to_string()
}

fn default_keep_alive() -> u64 {
    60
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_publish_timeout() -> u64 {
    10
}

impl MqttConfig {
    /// Create a configuration for `host` with all other fields at their defaults.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: None,
            disable_tls: false,
            ca_file: None,
            username: None,
            password: None,
            password_file: None,
            client_id: default_client_id(),
            topic_prefix: default_topic_prefix(),
            keep_alive_secs: default_keep_alive(),
            connect_timeout_secs: default_connect_timeout(),
            publish_timeout_secs: default_publish_timeout(),
            reconnect: ReconnectConfig::default(),
        }
    }

    /// Effective broker port.
    pub fn port(&self) -> u16 {
        match self.port {
            Some(port) => port,
            None if self.disable_tls => MQTT_DEFAULT_PORT,
            None => MQTT_DEFAULT_TLS_PORT,
        }
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_secs(self.publish_timeout_secs)
    }

    /// Resolve the password, reading `password_file` if configured.
    pub fn resolve_password(&self) -> Result<Option<String>> {
        match (&self.password, &self.password_file) {
            (Some(_), Some(_)) => Err(Error::Config(
                "mqtt.password and mqtt.password_file are mutually exclusive".to_string(),
            )),
            (Some(password), None) => Ok(Some(password.clone())),
            (None, Some(path)) => read_password_file(path).map(Some),
            (None, None) => Ok(None),
        }
    }

    /// Validate the connection settings.
    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(Error::Config("mqtt.host must not be empty".to_string()));
        }
        if (self.password.is_some() || self.password_file.is_some()) && self.username.is_none() {
            return Err(Error::Config("Missing MQTT username".to_string()));
        }
        if self.password.is_some() && self.password_file.is_some() {
            return Err(Error::Config(
                "mqtt.password and mqtt.password_file are mutually exclusive".to_string(),
            ));
        }
        if self.disable_tls && self.ca_file.is_some() {
            return Err(Error::Config(
                "mqtt.ca_file given but TLS is disabled".to_string(),
            ));
        }
        if self.topic_prefix.is_empty() {
            return Err(Error::Config(
                "mqtt.topic_prefix must not be empty".to_string(),
            ));
        }
        // rumqttc rejects keep-alive intervals below one second
        if self.keep_alive_secs == 0 {
            return Err(Error::Config("mqtt.keep_alive_secs must be > 0".to_string()));
        }
        if self.connect_timeout_secs == 0 || self.publish_timeout_secs == 0 {
            return Err(Error::Config(
                "mqtt connect and publish timeouts must be > 0".to_string(),
            ));
        }
        self.reconnect.validate()
    }
}

/// Longest accepted reconnect delay: one day.
pub const MAX_RECONNECT_DELAY_SECS: u64 = 86_400;

/// Largest accepted growth factor between reconnect delays.
pub const MAX_RECONNECT_MULTIPLIER: f64 = 100.0;

/// Exponential backoff between reconnect attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Delay before the first retry, in milliseconds.
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    /// Upper bound for the delay, in seconds.
    #[serde(default = "default_max_delay")]
    pub max_delay_secs: u64,

    /// Growth factor applied after every failed attempt.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

fn default_initial_delay() -> u64 {
    1000
}

fn default_max_delay() -> u64 {
    60
}

fn default_multiplier() -> f64 {
    2.0
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay(),
            max_delay_secs: default_max_delay(),
            multiplier: default_multiplier(),
        }
    }
}

impl ReconnectConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_secs(self.max_delay_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.initial_delay_ms == 0 {
            return Err(Error::Config(
                "reconnect.initial_delay_ms must be > 0".to_string(),
            ));
        }
        if self.max_delay() < self.initial_delay() {
            return Err(Error::Config(
                "reconnect.max_delay_secs must not be below reconnect.initial_delay_ms"
                    .to_string(),
            ));
        }
        if self.max_delay_secs > MAX_RECONNECT_DELAY_SECS {
            return Err(Error::Config(format!(
                "reconnect.max_delay_secs must be at most {}",
                MAX_RECONNECT_DELAY_SECS
            )));
        }
        if !(1.0..=MAX_RECONNECT_MULTIPLIER).contains(&self.multiplier) {
            return Err(Error::Config(format!(
                "reconnect.multiplier must be between 1 and {}",
                MAX_RECONNECT_MULTIPLIER
            )));
        }
        Ok(())
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format (default).
    #[default]
    Text,
    /// Structured JSON format.
    Json,
}

/// Common logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format: "text" or "json".
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Read a password file, stripping one trailing `\n` or `\r\n`.
pub fn read_password_file(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!(
            "Failed to read password file '{}': {}",
            path.display(),
            e
        ))
    })?;
    tracing::debug!(path = %path.display(), "Read MQTT password file");
    Ok(strip_trailing_newline(&content).to_string())
}

fn strip_trailing_newline(content: &str) -> &str {
    content
        .strip_suffix("\r\n")
        .or_else(|| content.strip_suffix('\n'))
        .unwrap_or(content)
}

/// Load a configuration file in JSON5 format.
pub fn load_config<T: for<'de> Deserialize<'de>>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!(
            "Failed to read config file '{}': {}",
            path.display(),
            e
        ))
    })?;

    json5::from_str(&content).map_err(|e| {
        Error::Config(format!(
            "Failed to parse config file '{}': {}",
            path.display(),
            e
        ))
    })
}

/// Load a configuration from a JSON5 string.
pub fn parse_config<T: for<'de> Deserialize<'de>>(content: &str) -> Result<T> {
    json5::from_str(content).map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
}
