use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single decoded reading of the thermo/hygrometer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// Temperature in degrees Celsius.
    pub temperature_celsius: f64,

    /// Relative humidity in percent (0-100).
    pub relative_humidity_percent: f64,

    /// When the packet carrying this reading was decoded.
    pub captured_at: DateTime<Utc>,
}

impl Measurement {
    /// Create a measurement captured now.
    pub fn new(temperature_celsius: f64, relative_humidity_percent: f64) -> Self {
        Self::captured_at(temperature_celsius, relative_humidity_percent, Utc::now())
    }

    pub fn captured_at(
        temperature_celsius: f64,
        relative_humidity_percent: f64,
        captured_at: DateTime<Utc>,
    ) -> Self {
        Self {
            temperature_celsius,
            relative_humidity_percent,
            captured_at,
        }
    }

    /// Value of one channel.
    pub fn value(&self, channel: Channel) -> f64 {
        match channel {
            Channel::Temperature => self.temperature_celsius,
            Channel::RelativeHumidity => self.relative_humidity_percent,
        }
    }

    /// MQTT payload for one channel.
    pub fn payload(&self, channel: Channel) -> String {
        format_value(self.value(channel))
    }
}

impl std::fmt::Display for Measurement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:.02}°C {:.02}% (decoded at {})",
            self.temperature_celsius,
            self.relative_humidity_percent,
            self.captured_at.to_rfc3339()
        )
    }
}

/// The two channels reported by the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Temperature,
    RelativeHumidity,
}

impl Channel {
    /// All channels, in publish order.
    pub const ALL: [Channel; 2] = [Channel::Temperature, Channel::RelativeHumidity];

    /// Topic suffix and discovery object id.
    pub fn object_id(&self) -> &'static str {
        match self {
            Channel::Temperature => "temperature-degrees-celsius",
            Channel::RelativeHumidity => "relative-humidity-percent",
        }
    }

    /// Home Assistant sensor device class.
    pub fn device_class(&self) -> &'static str {
        match self {
            Channel::Temperature => "temperature",
            Channel::RelativeHumidity => "humidity",
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            Channel::Temperature => "°C",
            Channel::RelativeHumidity => "%",
        }
    }

    /// Human-readable name, appended to the node id for display.
    pub fn display_name(&self) -> &'static str {
        match self {
            Channel::Temperature => "temperature",
            Channel::RelativeHumidity => "relative humidity",
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.object_id())
    }
}

/// Format a value as a decimal string with at most two fractional digits.
///
/// # Example
/// ```
/// use sensor_mqtt_common::measurement::format_value;
///
/// assert_eq!(format_value(21.5), "21.5");
/// assert_eq!(format_value(23.1234567), "23.12");
/// assert_eq!(format_value(20.0), "20");
/// ```
pub fn format_value(value: f64) -> String {
    let rounded = (value * 100.0).round() / 100.0;
    // avoid "-0"
    if rounded == 0.0 {
        return "0".to_string();
    }
    format!("{}", rounded)
}
