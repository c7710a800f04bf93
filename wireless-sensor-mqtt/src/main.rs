//! MQTT client reporting measurements of FT017TH wireless thermo/hygrometers.

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{CommandFactory, FromArgMatches, Parser};
use sensor_mqtt_framework::{BridgeArgs, BridgeConfig, BridgeRunner, shutdown_signal};

use wireless_sensor_mqtt::{Bridge, BridgeExit, SensorSource, WirelessSensorBridgeConfig};

const DEFAULT_CONFIG: &str = "wireless-sensor-mqtt.json5";

/// Exit code for configuration and startup errors.
const STARTUP_FAILURE: u8 = 1;

#[derive(Parser, Debug)]
#[command(
    name = "wireless-sensor-mqtt",
    version,
    about = "MQTT client reporting measurements of FT017TH wireless thermo/hygrometers"
)]
struct Args {
    #[command(flatten)]
    bridge: BridgeArgs,

    /// Publish random measurements instead of reading the sensor.
    #[arg(long)]
    mock_measurements: bool,
}

impl Args {
    fn parse_with_default(default_config: &'static str) -> Self {
        let matches = Self::command()
            .mut_arg("config", |arg| arg.default_value(default_config))
            .get_matches();

        Self::from_arg_matches(&matches).unwrap_or_else(|e| e.exit())
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    match run().await {
        Ok(exit) => ExitCode::from(exit.exit_code()),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(STARTUP_FAILURE)
        }
    }
}

async fn run() -> Result<BridgeExit> {
    let args = Args::parse_with_default(DEFAULT_CONFIG);

    let mut config = WirelessSensorBridgeConfig::load(&args.bridge.config)
        .context("Failed to load configuration")?;
    if args.mock_measurements {
        config.sensor.mock_measurements = true;
    }
    config
        .sensor
        .require_source()
        .context("Invalid sensor configuration")?;

    let runner = BridgeRunner::new_with_args("wireless-sensor-mqtt", config, Some(&args.bridge))?;
    let config = runner.config();

    let publisher = runner.publisher()?;
    let source = match SensorSource::open(&config.sensor) {
        Ok(source) => source,
        Err(e) => {
            let exit = BridgeExit::from(e);
            tracing::error!(code = exit.exit_code(), "Failed to open sensor: {}", exit);
            return Ok(exit);
        }
    };
    let bridge = Bridge::from_config(config, source, publisher)?;

    tracing::info!(
        topic_prefix = %config.mqtt.topic_prefix,
        node_id = %config.homeassistant.node_id,
        stall_timeout = ?config.sensor.stall_timeout(),
        "Bridge running"
    );

    Ok(bridge.run(shutdown_signal()).await)
}
