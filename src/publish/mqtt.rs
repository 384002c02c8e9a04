//! MQTT property publisher.
//!
//! Topic layout below the configured base topic:
//! - `<base>/<slug>/<property>`: retained JSON value
//! - `<base>/<slug>/$description`: retained thing description
//! - `<base>/<slug>/<property>/set`: client writes (JSON value)

use super::{PropertyPublisher, ThingDescription};
use crate::config::MqttConfig;
use crate::error::{BridgeError, Result};
use crate::thing::{ConsumerHandle, ConsumerTask, PropertyDescriptor, PropertyValue};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, Publish, QoS};
use std::collections::HashMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Pause before polling the event loop again after a connection error
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Outgoing request queue of the client. Registration bursts at startup
/// happen before the event loop drains anything.
const REQUEST_CAPACITY: usize = 1024;

/// A client write parsed from a `/set` topic.
#[derive(Debug, Clone, PartialEq)]
pub struct SetRequest {
    pub thing: String,
    pub property: String,
    pub value: PropertyValue,
}

impl SetRequest {
    /// Parse `<base>/<slug>/<property>/set` with a JSON (or bare string) payload.
    pub fn parse(base_topic: &str, topic: &str, payload: &[u8]) -> Option<Self> {
        let rest = topic.strip_prefix(base_topic)?.strip_prefix('/')?;
        let rest = rest.strip_suffix("/set")?;
        let (thing, property) = rest.split_once('/')?;
        if thing.is_empty() || property.is_empty() || property.contains('/') {
            return None;
        }

        let value = match serde_json::from_slice::<PropertyValue>(payload) {
            Ok(value) => value,
            Err(_) => {
                let text = std::str::from_utf8(payload).ok()?.trim();
                if text.is_empty() {
                    return None;
                }
                PropertyValue::String(text.to_string())
            }
        };

        Some(Self {
            thing: thing.to_string(),
            property: property.to_string(),
            value,
        })
    }

    /// Parse an incoming publish. Retained messages are ignored: the broker
    /// replays them on every subscribe, which would repeat the command.
    pub fn from_publish(base_topic: &str, publish: &Publish) -> Option<Self> {
        if publish.retain {
            return None;
        }
        Self::parse(base_topic, &publish.topic, &publish.payload)
    }
}

/// Publishes properties as retained MQTT topics.
pub struct MqttPublisher {
    client: AsyncClient,
    base_topic: String,
    /// Thing descriptions by slug, with the properties registered so far
    descriptions: Mutex<HashMap<String, serde_json::Value>>,
}

impl MqttPublisher {
    /// Create the publisher and the event loop that must be driven with
    /// [`MqttConnection::run`].
    pub fn new(config: &MqttConfig) -> Result<(Self, MqttConnection)> {
        let base_topic = config.base_topic.trim_end_matches('/').to_string();
        if base_topic.is_empty() || base_topic.contains(['+', '#']) {
            return Err(BridgeError::Mqtt(format!(
                "invalid base topic {:?}",
                config.base_topic
            )));
        }

        let mut options =
            MqttOptions::new(&config.client_id, &config.broker_host, config.broker_port);
        options.set_keep_alive(Duration::from_secs(30));

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            options.set_credentials(username, password);
        }

        let (client, event_loop) = AsyncClient::new(options, REQUEST_CAPACITY);

        let connection = MqttConnection {
            client: client.clone(),
            event_loop,
            base_topic: base_topic.clone(),
        };
        let publisher = Self {
            client,
            base_topic,
            descriptions: Mutex::new(HashMap::new()),
        };
        Ok((publisher, connection))
    }

    fn property_topic(&self, thing: &ThingDescription, name: &str) -> String {
        format!("{}/{}/{}", self.base_topic, thing.slug, name)
    }

    fn description_topic(&self, thing: &ThingDescription) -> String {
        format!("{}/{}/$description", self.base_topic, thing.slug)
    }

    fn publish_retained(&self, topic: String, payload: String) {
        debug!("[MQTT] {} = {}", topic, payload);
        // try_publish queues without awaiting; callers run on the consumer context.
        if let Err(e) = self
            .client
            .try_publish(topic.as_str(), QoS::AtLeastOnce, true, payload)
        {
            warn!("[MQTT] Failed to queue publish on {}: {}", topic, e);
        }
    }
}

impl PropertyPublisher for MqttPublisher {
    fn register_property(
        &self,
        thing: &ThingDescription,
        property: &PropertyDescriptor,
        value: &PropertyValue,
    ) {
        let description = {
            let mut descriptions = self.descriptions.lock();
            let entry = descriptions.entry(thing.slug.clone()).or_insert_with(|| {
                let mut json = serde_json::to_value(thing).unwrap_or_default();
                json["properties"] = serde_json::json!({});
                json
            });
            entry["properties"][property.name.as_str()] = property.to_json();
            entry.to_string()
        };

        self.publish_retained(self.description_topic(thing), description);
        self.push_external_update(thing, &property.name, value);
    }

    fn push_external_update(&self, thing: &ThingDescription, name: &str, value: &PropertyValue) {
        let payload = match serde_json::to_string(value) {
            Ok(payload) => payload,
            Err(e) => {
                error!("[MQTT] Failed to encode {}: {}", name, e);
                return;
            }
        };
        self.publish_retained(self.property_topic(thing, name), payload);
    }
}

/// Drives the MQTT connection and turns `/set` messages into client writes.
pub struct MqttConnection {
    client: AsyncClient,
    event_loop: EventLoop,
    base_topic: String,
}

impl MqttConnection {
    fn set_filter(&self) -> String {
        format!("{}/+/+/set", self.base_topic)
    }

    /// Run until cancelled.
    pub async fn run(mut self, consumer: ConsumerHandle, cancel: CancellationToken) {
        info!("[MQTT] Starting event loop");

        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                event = self.event_loop.poll() => event,
            };

            match event {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    let filter = self.set_filter();
                    info!("[MQTT] Connected, subscribing to {}", filter);
                    // Re-subscribe on every (re)connect since the session is not persistent.
                    if let Err(e) = self.client.try_subscribe(filter.as_str(), QoS::AtLeastOnce) {
                        warn!("[MQTT] Failed to subscribe to {}: {}", filter, e);
                    }
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    let Some(request) = SetRequest::from_publish(&self.base_topic, &publish)
                    else {
                        debug!(
                            "[MQTT] Ignoring message on {} (retain={})",
                            publish.topic, publish.retain
                        );
                        continue;
                    };

                    debug!(
                        "[MQTT] Write {} {} = {}",
                        request.thing, request.property, request.value
                    );
                    let task = ConsumerTask::ClientWrite {
                        thing: request.thing,
                        name: request.property,
                        value: request.value,
                        ack: None,
                    };
                    if consumer.submit(task).is_err() {
                        error!("[MQTT] Consumer closed");
                        break;
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    error!("[MQTT] Connection error: {:?}", e);
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(RECONNECT_DELAY) => {}
                    }
                }
            }
        }

        if let Err(e) = self.client.try_disconnect() {
            debug!("[MQTT] Disconnect: {}", e);
        }
        info!("[MQTT] Event loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_set_request() {
        let request =
            SetRequest::parse("webthings", "webthings/inverter-1/power_limit/set", b"500")
                .unwrap();
        assert_eq!(request.thing, "inverter-1");
        assert_eq!(request.property, "power_limit");
        assert_eq!(request.value, PropertyValue::Integer(500));
    }

    #[test]
    fn test_parse_set_request_nested_base() {
        let request =
            SetRequest::parse("home/solar", "home/solar/inverter-1/power_limit/set", b"true")
                .unwrap();
        assert_eq!(request.thing, "inverter-1");
        assert_eq!(request.value, PropertyValue::Boolean(true));
    }

    #[test]
    fn test_parse_bare_string_payload() {
        let request =
            SetRequest::parse("webthings", "webthings/inverter-1/name/set", b" Roof ").unwrap();
        assert_eq!(request.value, PropertyValue::String("Roof".into()));
    }

    #[test]
    fn test_retained_set_is_ignored() {
        let mut publish = Publish::new(
            "webthings/inverter-1/power_limit/set",
            QoS::AtLeastOnce,
            "500",
        );
        let request = SetRequest::from_publish("webthings", &publish).unwrap();
        assert_eq!(request.value, PropertyValue::Integer(500));

        publish.retain = true;
        assert!(SetRequest::from_publish("webthings", &publish).is_none());
    }

    #[test]
    fn test_parse_rejects_other_topics() {
        assert!(SetRequest::parse("webthings", "webthings/inverter-1/power_limit", b"1").is_none());
        assert!(SetRequest::parse("webthings", "other/inverter-1/power_limit/set", b"1").is_none());
        assert!(SetRequest::parse("webthings", "webthings/inverter-1/set", b"1").is_none());
        assert!(SetRequest::parse("webthings", "webthings/a/b/c/set", b"1").is_none());
        assert!(SetRequest::parse("webthings", "webthings//p/set", b"1").is_none());
        assert!(SetRequest::parse("webthings", "webthings/inverter-1/p/set", b"").is_none());
    }

    #[test]
    fn test_invalid_base_topic() {
        for base_topic in ["", "/", "solar/#", "+/x"] {
            let config = MqttConfig {
                base_topic: base_topic.to_string(),
                ..MqttConfig::default()
            };
            assert!(matches!(
                MqttPublisher::new(&config),
                Err(BridgeError::Mqtt(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_register_accumulates_description() {
        let config = MqttConfig::default();
        let (publisher, _connection) = MqttPublisher::new(&config).unwrap();
        let thing = ThingDescription {
            id: "urn:dev:ops:inverter-1".into(),
            slug: "inverter-1".into(),
            title: "Inverter Balcony".into(),
            description: "Solar inverter".into(),
            capabilities: vec!["MultiLevelSensor".into()],
        };
        let descriptor = |name: &str| PropertyDescriptor {
            name: name.into(),
            kind: crate::thing::PropertyType::Number,
            mode: crate::thing::AccessMode::ReadOnly,
            metadata: crate::thing::PropertyMetadata::new(name, name),
        };

        publisher.register_property(&thing, &descriptor("p_ac"), &PropertyValue::Number(1.0));
        publisher.register_property(&thing, &descriptor("u_ac"), &PropertyValue::Number(2.0));

        let descriptions = publisher.descriptions.lock();
        let description = &descriptions["inverter-1"];
        assert_eq!(description["id"], "urn:dev:ops:inverter-1");
        assert_eq!(description["@type"][0], "MultiLevelSensor");
        assert!(description["properties"]["p_ac"].is_object());
        assert!(description["properties"]["u_ac"].is_object());
        assert!(description.get("slug").is_none());
    }
}
