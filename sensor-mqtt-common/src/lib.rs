//! Sensor MQTT Common Library
//!
//! This crate provides shared types and utilities for sensor-to-MQTT bridges:
//!
//! - [`measurement`] - Measurement data model and payload formatting
//! - [`topic`] - State and discovery topic layout
//! - [`config`] - Configuration types and loading (JSON5 format)
//! - [`error`] - Error types

pub mod config;
pub mod error;
pub mod measurement;
pub mod topic;

// Re-export commonly used types at the crate root
pub use config::{
    LogFormat, LoggingConfig, MqttConfig, ReconnectConfig, load_config, parse_config,
    read_password_file,
};
pub use error::{Error, Result};
pub use measurement::{Channel, Measurement, format_value};
pub use topic::{DISCOVERY_PREFIX, NODE_ID_ALLOWED_CHARS, TopicSet, is_valid_node_id};

/// Initialize tracing with the given configuration.
///
/// Supports two output formats:
/// - `LogFormat::Text` (default): Human-readable text format
/// - `LogFormat::Json`: Structured JSON format for log aggregation systems
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format {
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(fmt::layer())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
    }

    Ok(())
}
