//! Error types for the bridge framework.

use std::time::Duration;

use thiserror::Error;

/// Result type alias using [`BridgeError`].
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Errors that can occur in a bridge.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration file not found.
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Configuration parse error.
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(String),

    /// Configuration validation error.
    #[error("Configuration validation failed: {0}")]
    ConfigValidation(String),

    /// Connection attempt failed.
    #[error("MQTT connection error: {0}")]
    Connect(String),

    /// Connection attempt exceeded its deadline.
    #[error("MQTT connection not established within {0:?}")]
    ConnectTimeout(Duration),

    /// Broker refused the credentials; retrying cannot succeed.
    #[error("MQTT broker rejected connection: {0}")]
    Rejected(String),

    /// Operation requires an established connection.
    #[error("Not connected to MQTT broker")]
    NotConnected,

    /// Publishing error.
    #[error("Failed to publish to {topic}: {message}")]
    Publish { topic: String, message: String },

    /// Broker did not acknowledge a publish in time.
    #[error("Publish to {topic} not acknowledged within {timeout:?}")]
    PublishTimeout { topic: String, timeout: Duration },

    /// Established connection dropped.
    #[error("MQTT connection lost: {0}")]
    ConnectionLost(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl BridgeError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a configuration validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ConfigValidation(msg.into())
    }

    /// Create a publish error for `topic`.
    pub fn publish(topic: impl Into<String>, msg: impl ToString) -> Self {
        Self::Publish {
            topic: topic.into(),
            message: msg.to_string(),
        }
    }

    /// Wrap an error with context.
    pub fn with_context<E>(context: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::WithContext {
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// Whether retrying the connection cannot recover from this error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }
}

impl From<sensor_mqtt_common::Error> for BridgeError {
    fn from(err: sensor_mqtt_common::Error) -> Self {
        match err {
            sensor_mqtt_common::Error::Io(e) => Self::Io(e),
            other => Self::ConfigValidation(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<json5::Error> for BridgeError {
    fn from(err: json5::Error) -> Self {
        Self::ConfigParse(err.to_string())
    }
}
