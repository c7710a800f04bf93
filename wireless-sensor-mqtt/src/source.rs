//! Measurement sources: where decoded sensor packets come from.
//!
//! The receiver hardware is driven by an external driver process that prints
//! one JSON document per decoded packet. [`MockSource`] stands in for it when
//! no hardware is available.

use std::process::Stdio;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};

use sensor_mqtt_common::Measurement;

use crate::config::SensorConfig;

/// Number of measurements produced by [`MockSource`].
pub const MOCK_MEASUREMENT_COUNT: usize = 3;

/// Delay before each mock measurement.
pub const MOCK_MEASUREMENT_INTERVAL: Duration = Duration::from_secs(8);

/// Error type for measurement sources.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    /// A packet was received but could not be decoded. Skippable.
    #[error("failed to decode packet: {0}")]
    Decode(String),

    /// The receiver or its driver failed. Not recoverable.
    #[error("sensor driver fault: {0}")]
    Fault(String),

    /// A finite source has no more measurements.
    #[error("measurement stream ended")]
    Exhausted,
}

impl SourceError {
    /// Whether the bridge may keep reading after this error.
    pub fn is_skippable(&self) -> bool {
        matches!(self, SourceError::Decode(_))
    }
}

/// A lazy, non-restartable stream of measurements.
#[allow(async_fn_in_trait)]
pub trait MeasurementSource {
    /// Wait for the next decoded packet.
    ///
    /// Must be cancel safe: the bridge races this against timers and drops
    /// the future when another branch wins.
    async fn next_measurement(&mut self) -> Result<Measurement, SourceError>;

    /// Release the receiver.
    async fn close(&mut self) {}
}

/// Random measurements, for running without hardware.
#[derive(Debug)]
pub struct MockSource {
    remaining: usize,
    interval: Duration,
}

impl MockSource {
    pub fn new() -> Self {
        Self::with_count(MOCK_MEASUREMENT_COUNT, MOCK_MEASUREMENT_INTERVAL)
    }

    pub fn with_count(count: usize, interval: Duration) -> Self {
        Self {
            remaining: count,
            interval,
        }
    }

    fn random_measurement() -> Measurement {
        let mut rng = rand::rng();
        Measurement::new(
            rng.random_range(20.0..30.0),
            rng.random_range(40.0..60.0),
        )
    }
}

impl Default for MockSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MeasurementSource for MockSource {
    async fn next_measurement(&mut self) -> Result<Measurement, SourceError> {
        if self.remaining == 0 {
            return Err(SourceError::Exhausted);
        }
        tokio::time::sleep(self.interval).await;
        self.remaining -= 1;
        Ok(Self::random_measurement())
    }
}

/// A packet as printed by the receiver driver.
#[derive(Debug, Deserialize)]
struct DriverPacket {
    temperature_degrees_celsius: f64,
    /// Fraction between 0 and 1.
    relative_humidity: f64,
    #[serde(default)]
    decoding_timestamp: Option<DateTime<Utc>>,
}

/// Decode one line of driver output.
pub fn parse_driver_line(line: &str) -> Result<Measurement, SourceError> {
    let packet: DriverPacket =
        serde_json::from_str(line).map_err(|e| SourceError::Decode(e.to_string()))?;

    if !packet.temperature_degrees_celsius.is_finite() {
        return Err(SourceError::Decode(format!(
            "temperature out of range: {}",
            packet.temperature_degrees_celsius
        )));
    }
    if !(0.0..=1.0).contains(&packet.relative_humidity) {
        return Err(SourceError::Decode(format!(
            "relative humidity out of range: {}",
            packet.relative_humidity
        )));
    }

    Ok(Measurement::captured_at(
        packet.temperature_degrees_celsius,
        packet.relative_humidity * 100.0,
        packet.decoding_timestamp.unwrap_or_else(Utc::now),
    ))
}

/// Measurements read from a receiver driver subprocess.
///
/// The child is killed when the source is closed or dropped.
#[derive(Debug)]
pub struct CommandSource {
    program: String,
    child: Child,
    lines: Lines<BufReader<ChildStdout>>,
}

impl CommandSource {
    /// Start the driver. `command` is the program followed by its arguments.
    pub fn spawn(command: &[String]) -> Result<Self, SourceError> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| SourceError::Fault("empty driver command".to_string()))?;

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SourceError::Fault(format!("failed to start {}: {}", program, e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SourceError::Fault(format!("no stdout for {}", program)))?;

        tracing::debug!(program = %program, pid = ?child.id(), "Started sensor driver");

        Ok(Self {
            program: program.clone(),
            child,
            lines: BufReader::new(stdout).lines(),
        })
    }

    async fn exit_reason(&mut self) -> String {
        match self.child.wait().await {
            Ok(status) => format!("{} exited ({})", self.program, status),
            Err(e) => format!("{} ended: {}", self.program, e),
        }
    }
}

impl MeasurementSource for CommandSource {
    async fn next_measurement(&mut self) -> Result<Measurement, SourceError> {
        loop {
            // `next_line` is cancel safe
            match self.lines.next_line().await {
                Ok(Some(line)) if line.trim().is_empty() => continue,
                Ok(Some(line)) => return parse_driver_line(line.trim()),
                Ok(None) => return Err(SourceError::Fault(self.exit_reason().await)),
                Err(e) => {
                    return Err(SourceError::Fault(format!(
                        "failed to read from {}: {}",
                        self.program, e
                    )));
                }
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.child.kill().await {
            tracing::debug!(error = %e, "Sensor driver already stopped");
        }
    }
}

/// The source selected by configuration.
#[derive(Debug)]
pub enum SensorSource {
    Mock(MockSource),
    Driver(CommandSource),
}

impl SensorSource {
    /// Open the configured source. Mock measurements take precedence over
    /// the driver command.
    ///
    /// See [`SensorConfig::require_source`] for telling a missing source
    /// apart from a receiver that fails to start.
    pub fn open(config: &SensorConfig) -> Result<Self, SourceError> {
        if config.mock_measurements {
            tracing::info!(
                count = MOCK_MEASUREMENT_COUNT,
                "Publishing mock measurements instead of reading the sensor"
            );
            return Ok(SensorSource::Mock(MockSource::new()));
        }

        if config.driver_command.is_empty() {
            return Err(SourceError::Fault(
                "no sensor driver configured (set sensor.driver_command or use --mock-measurements)"
                    .to_string(),
            ));
        }

        Ok(SensorSource::Driver(CommandSource::spawn(
            &config.driver_command,
        )?))
    }
}

impl MeasurementSource for SensorSource {
    async fn next_measurement(&mut self) -> Result<Measurement, SourceError> {
        match self {
            SensorSource::Mock(source) => source.next_measurement().await,
            SensorSource::Driver(source) => source.next_measurement().await,
        }
    }

    async fn close(&mut self) {
        match self {
            SensorSource::Mock(source) => source.close().await,
            SensorSource::Driver(source) => source.close().await,
        }
    }
}
