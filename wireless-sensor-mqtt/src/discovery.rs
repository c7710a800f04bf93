//! Home Assistant MQTT discovery.
//!
//! Each channel is announced as a `sensor` entity with a retained config
//! message, so Home Assistant picks it up even if it starts after the bridge.

use serde::Serialize;

use sensor_mqtt_common::{Channel, TopicSet};
use sensor_mqtt_framework::{BrokerLink, Publisher, Result};

/// Sensor model, used in device info and unique ids.
pub const MODEL: &str = "FT017TH";

/// Leading part of every discovery unique id. Changing it orphans the
/// entities Home Assistant already registered.
pub const UNIQUE_ID_NAMESPACE: &str = "fphammerle/wireless-sensor-mqtt";

/// Seconds after which Home Assistant marks a channel unavailable.
pub const EXPIRE_AFTER_SECS: u64 = 600;

/// Device the two sensor entities belong to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceInfo {
    pub identifiers: Vec<String>,
    pub model: String,
}

/// Discovery config payload for one channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscoveryDescriptor {
    pub unique_id: String,
    pub device_class: String,
    pub name: String,
    pub state_topic: String,
    pub unit_of_measurement: String,
    pub expire_after: u64,
    pub device: DeviceInfo,
}

impl DiscoveryDescriptor {
    pub fn new(topics: &TopicSet, node_id: &str, channel: Channel) -> Self {
        Self {
            unique_id: format!(
                "{}/{}/{}/{}",
                UNIQUE_ID_NAMESPACE,
                MODEL,
                node_id,
                channel.object_id()
            ),
            device_class: channel.device_class().to_string(),
            name: format!("{} {}", node_id, channel.display_name()),
            state_topic: topics.state(channel).to_string(),
            unit_of_measurement: channel.unit().to_string(),
            expire_after: EXPIRE_AFTER_SECS,
            device: DeviceInfo {
                identifiers: vec![format!("{}/{}", MODEL, node_id)],
                model: MODEL.to_string(),
            },
        }
    }
}

/// A serialized discovery message, ready to publish.
#[derive(Debug, Clone, PartialEq)]
struct Announcement {
    topic: String,
    payload: Vec<u8>,
}

/// Publishes the discovery configs after every (re)connect.
#[derive(Debug, Clone)]
pub struct DiscoveryAnnouncer {
    descriptors: Vec<DiscoveryDescriptor>,
    announcements: Vec<Announcement>,
}

impl DiscoveryAnnouncer {
    /// Build and serialize the descriptors for all channels.
    pub fn new(topics: &TopicSet, node_id: &str) -> Result<Self> {
        let mut descriptors = Vec::with_capacity(Channel::ALL.len());
        let mut announcements = Vec::with_capacity(Channel::ALL.len());

        for channel in Channel::ALL {
            let descriptor = DiscoveryDescriptor::new(topics, node_id, channel);
            announcements.push(Announcement {
                topic: topics.discovery(channel).to_string(),
                payload: serde_json::to_vec(&descriptor)?,
            });
            descriptors.push(descriptor);
        }

        Ok(Self {
            descriptors,
            announcements,
        })
    }

    /// Descriptors in announce order (temperature first).
    pub fn descriptors(&self) -> &[DiscoveryDescriptor] {
        &self.descriptors
    }

    /// Publish all discovery configs, retained.
    pub async fn announce<L: BrokerLink>(&self, publisher: &mut Publisher<L>) -> Result<()> {
        for announcement in &self.announcements {
            tracing::debug!(topic = %announcement.topic, "Publishing home assistant config");
            publisher
                .publish(&announcement.topic, &announcement.payload, true)
                .await?;
        }
        tracing::info!(
            entities = self.announcements.len(),
            "Announced sensors to home assistant"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use sensor_mqtt_framework::mock::MockLink;

    use super::*;

    fn topics(node_id: &str) -> TopicSet {
        TopicSet::new("wireless-sensor/FT017TH", "homeassistant", node_id).unwrap()
    }

    #[test]
    fn test_descriptor_json() {
        let announcer = DiscoveryAnnouncer::new(&topics("living-room"), "living-room").unwrap();
        let [temperature, humidity] = announcer.descriptors() else {
            panic!("expected two descriptors");
        };

        assert_eq!(
            serde_json::to_value(temperature).unwrap(),
            json!({
                "unique_id": "fphammerle/wireless-sensor-mqtt/FT017TH/living-room/temperature-degrees-celsius",
                "device_class": "temperature",
                "name": "living-room temperature",
                "state_topic": "wireless-sensor/FT017TH/temperature-degrees-celsius",
                "unit_of_measurement": "°C",
                "expire_after": 600,
                "device": {"identifiers": ["FT017TH/living-room"], "model": "FT017TH"},
            })
        );
        assert_eq!(
            serde_json::to_value(humidity).unwrap(),
            json!({
                "unique_id": "fphammerle/wireless-sensor-mqtt/FT017TH/living-room/relative-humidity-percent",
                "device_class": "humidity",
                "name": "living-room relative humidity",
                "state_topic": "wireless-sensor/FT017TH/relative-humidity-percent",
                "unit_of_measurement": "%",
                "expire_after": 600,
                "device": {"identifiers": ["FT017TH/living-room"], "model": "FT017TH"},
            })
        );
    }

    #[tokio::test]
    async fn test_announce_is_retained_and_repeatable() {
        let link = MockLink::new();
        let mut publisher =
            Publisher::new(link.clone(), Duration::from_secs(1), Duration::from_secs(1));
        let announcer = DiscoveryAnnouncer::new(&topics("FT017TH"), "FT017TH").unwrap();

        publisher.connect().await.unwrap();
        announcer.announce(&mut publisher).await.unwrap();
        announcer.announce(&mut publisher).await.unwrap();

        let published = link.published();
        assert_eq!(published.len(), 4);
        assert!(published.iter().all(|m| m.retain));
        assert_eq!(
            published[0].topic,
            "homeassistant/sensor/FT017TH/temperature-degrees-celsius/config"
        );
        assert_eq!(
            published[1].topic,
            "homeassistant/sensor/FT017TH/relative-humidity-percent/config"
        );
        assert_eq!(published[0..2], published[2..4]);
    }

    #[tokio::test]
    async fn test_announce_requires_connection() {
        let link = MockLink::new();
        let mut publisher =
            Publisher::new(link.clone(), Duration::from_secs(1), Duration::from_secs(1));
        let announcer = DiscoveryAnnouncer::new(&topics("FT017TH"), "FT017TH").unwrap();

        assert!(announcer.announce(&mut publisher).await.is_err());
        assert!(link.published().is_empty());
    }
}
