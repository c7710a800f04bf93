//! Bridge runner for process setup and shutdown signalling.

use sensor_mqtt_common::{LoggingConfig, init_tracing};

use crate::BridgeArgs;
use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::link::MqttLink;
use crate::publisher::Publisher;

/// Bridge runner that prepares a bridge process.
///
/// Handles:
/// - Logging initialization (config level, overridable from the CLI)
/// - Building the MQTT publisher from config
///
/// The bridge itself drives the connection; nothing is spawned here.
pub struct BridgeRunner<C: BridgeConfig> {
    config: C,
}

impl<C: BridgeConfig> BridgeRunner<C> {
    /// Initialize logging from the config, with the log level optionally
    /// overridden on the command line.
    pub fn new_with_args(name: &str, config: C, args: Option<&BridgeArgs>) -> Result<Self> {
        let log_config = match args.and_then(BridgeArgs::log_level_override) {
            Some(level) => LoggingConfig {
                level: level.to_string(),
                ..config.logging().clone()
            },
            None => config.logging().clone(),
        };

        init_tracing(&log_config).map_err(|e| BridgeError::config(e.to_string()))?;

        tracing::info!(bridge = %name, version = env!("CARGO_PKG_VERSION"), "Starting bridge");

        Ok(Self { config })
    }

    /// Get a reference to the configuration.
    pub fn config(&self) -> &C {
        &self.config
    }

    /// Build a disconnected publisher for the configured broker.
    pub fn publisher(&self) -> Result<Publisher<MqttLink>> {
        let mqtt = self.config.mqtt();
        tracing::info!(
            "connecting to MQTT broker {}:{} (TLS {})",
            mqtt.host,
            mqtt.port(),
            if mqtt.disable_tls { "disabled" } else { "enabled" }
        );
        let link = MqttLink::from_config(mqtt)?;
        Ok(Publisher::with_config(link, mqtt))
    }
}

/// Resolve when the process is asked to stop (Ctrl+C, or SIGTERM on Unix).
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    tracing::info!("Received shutdown signal");
}

