use crate::error::{Error, Result};
use crate::measurement::Channel;

/// Default Home Assistant discovery prefix.
pub const DISCOVERY_PREFIX: &str = "homeassistant";

/// Characters allowed in a Home Assistant discovery node id.
pub const NODE_ID_ALLOWED_CHARS: &str = "a-zA-Z0-9_-";

/// Check whether `node_id` is usable as a discovery node id.
///
/// # Example
/// ```
/// use sensor_mqtt_common::topic::is_valid_node_id;
///
/// assert!(is_valid_node_id("living-room_1"));
/// assert!(!is_valid_node_id(""));
/// assert!(!is_valid_node_id("a/b"));
/// ```
pub fn is_valid_node_id(node_id: &str) -> bool {
    !node_id.is_empty()
        && node_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Topics used by the bridge, computed once at startup.
///
/// Measurement topics follow `<prefix>/<object_id>`, discovery topics follow
/// `<discovery_prefix>/sensor/<node_id>/<object_id>/config`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSet {
    temperature: String,
    relative_humidity: String,
    temperature_discovery: String,
    relative_humidity_discovery: String,
}

impl TopicSet {
    /// Build the topic set, validating `node_id`.
    ///
    /// # Example
    /// ```
    /// use sensor_mqtt_common::measurement::Channel;
    /// use sensor_mqtt_common::topic::TopicSet;
    ///
    /// let topics = TopicSet::new("home", "homeassistant", "FT017TH").unwrap();
    /// assert_eq!(topics.state(Channel::Temperature), "home/temperature-degrees-celsius");
    /// assert_eq!(
    ///     topics.discovery(Channel::RelativeHumidity),
    ///     "homeassistant/sensor/FT017TH/relative-humidity-percent/config"
    /// );
    /// ```
    pub fn new(prefix: &str, discovery_prefix: &str, node_id: &str) -> Result<Self> {
        if !is_valid_node_id(node_id) {
            return Err(Error::InvalidNodeId(node_id.to_string()));
        }
        let state = |channel: Channel| format!("{}/{}", prefix, channel.object_id());
        let discovery = |channel: Channel| {
            format!(
                "{}/sensor/{}/{}/config",
                discovery_prefix,
                node_id,
                channel.object_id()
            )
        };
        Ok(Self {
            temperature: state(Channel::Temperature),
            relative_humidity: state(Channel::RelativeHumidity),
            temperature_discovery: discovery(Channel::Temperature),
            relative_humidity_discovery: discovery(Channel::RelativeHumidity),
        })
    }

    /// State topic carrying the values of `channel`.
    pub fn state(&self, channel: Channel) -> &str {
        match channel {
            Channel::Temperature => &self.temperature,
            Channel::RelativeHumidity => &self.relative_humidity,
        }
    }

    /// Discovery config topic of `channel`.
    pub fn discovery(&self, channel: Channel) -> &str {
        match channel {
            Channel::Temperature => &self.temperature_discovery,
            Channel::RelativeHumidity => &self.relative_humidity_discovery,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_node_id() {
        assert!(is_valid_node_id("raspberrypi"));
        assert!(is_valid_node_id("da-sh"));
        assert!(is_valid_node_id("under_score"));
        assert!(!is_valid_node_id("\" or \"\"=\""));
        assert!(!is_valid_node_id(""));
        assert!(!is_valid_node_id("ümlaut"));
    }

    #[test]
    fn test_topic_set() {
        let topics =
            TopicSet::new("living-room/ft017th", "homeassistant", "bed-room-sensor").unwrap();

        assert_eq!(
            topics.state(Channel::Temperature),
            "living-room/ft017th/temperature-degrees-celsius"
        );
        assert_eq!(
            topics.state(Channel::RelativeHumidity),
            "living-room/ft017th/relative-humidity-percent"
        );
        assert_eq!(
            topics.discovery(Channel::Temperature),
            "homeassistant/sensor/bed-room-sensor/temperature-degrees-celsius/config"
        );
    }

    #[test]
    fn test_topic_set_rejects_node_id() {
        let result = TopicSet::new("home", "homeassistant", "bad/id");
        assert!(matches!(result, Err(Error::InvalidNodeId(id)) if id == "bad/id"));
    }
}
