use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use strum::{AsRefStr, Display, EnumString};

/// Load environment variables from .env file with robust parsing.
/// Handles values with spaces without requiring quotes.
///
/// Must be called before the tokio runtime is built.
pub fn load_dotenv() {
    load_dotenv_from(Path::new(".env"));
}

fn load_dotenv_from(env_path: &Path) {
    let Ok(content) = fs::read_to_string(env_path) else {
        return;
    };

    for (key, value) in parse_dotenv(&content) {
        // Only set if not already set (env vars take precedence)
        if std::env::var(key).is_err() {
            // SAFETY: callers run this before the runtime spawns any threads
            unsafe { std::env::set_var(key, value) };
        }
    }
}

/// Parse `KEY=value` lines, skipping blanks and comments.
fn parse_dotenv(content: &str) -> Vec<(&str, &str)> {
    let mut pairs = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        // Split at the first '=' so values may contain '='
        if let Some((key, value)) = line.split_once('=') {
            let key = key.trim();
            let mut value = value.trim();

            if value.len() >= 2
                && ((value.starts_with('"') && value.ends_with('"'))
                    || (value.starts_with('\'') && value.ends_with('\'')))
            {
                value = &value[1..value.len() - 1];
            }
            if !key.is_empty() {
                pairs.push((key, value));
            }
        }
    }
    pairs
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub dtu: DtuConfig,
    pub mqtt: MqttConfig,
    pub thing: ThingConfig,
    pub publisher: PublisherKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DtuConfig {
    /// Base URL of the AhoyDTU web interface
    pub url: String,
    pub poll_interval_secs: u64,
    /// Consecutive failed polls before an inverter is reported unavailable
    pub max_failures: u32,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttConfig {
    pub broker_host: String,
    pub broker_port: u16,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub base_topic: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThingConfig {
    /// Description shared by every published thing
    pub description: String,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum PublisherKind {
    Mqtt,
    Log,
}

impl Default for DtuConfig {
    fn default() -> Self {
        Self {
            url: "http://192.168.1.10".to_string(),
            poll_interval_secs: 15,
            max_failures: 3,
            request_timeout_secs: 5,
        }
    }
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker_host: "localhost".to_string(),
            broker_port: 1883,
            client_id: "inverter-property-bridge".to_string(),
            username: None,
            password: None,
            base_topic: "webthings".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dtu: DtuConfig::default(),
            mqtt: MqttConfig::default(),
            thing: ThingConfig {
                description: "Solar inverter".to_string(),
            },
            publisher: PublisherKind::Mqtt,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from defaults overridden by `lookup`.
    /// Unparseable numbers keep their default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        // DTU configuration
        if let Some(url) = lookup("AHOY_DTU_URL") {
            config.dtu.url = url;
        }
        if let Some(interval) = lookup("AHOY_POLL_INTERVAL")
            && let Ok(i) = interval.parse()
        {
            config.dtu.poll_interval_secs = i;
        }
        if let Some(failures) = lookup("AHOY_MAX_FAILURES")
            && let Ok(f) = failures.parse()
        {
            config.dtu.max_failures = f;
        }
        if let Some(description) = lookup("THING_DESCRIPTION") {
            config.thing.description = description;
        }
        if let Some(publisher) = lookup("PUBLISHER")
            && let Ok(p) = publisher.parse()
        {
            config.publisher = p;
        }

        // MQTT configuration
        if let Some(host) = lookup("MQTT_BROKER_HOST") {
            config.mqtt.broker_host = host;
        }
        if let Some(port) = lookup("MQTT_BROKER_PORT")
            && let Ok(p) = port.parse()
        {
            config.mqtt.broker_port = p;
        }
        if let Some(client_id) = lookup("MQTT_CLIENT_ID") {
            config.mqtt.client_id = client_id;
        }
        if let Some(username) = lookup("MQTT_USERNAME") {
            config.mqtt.username = Some(username);
        }
        if let Some(password) = lookup("MQTT_PASSWORD") {
            config.mqtt.password = Some(password);
        }
        if let Some(base_topic) = lookup("MQTT_BASE_TOPIC") {
            config.mqtt.base_topic = base_topic;
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(|_| None);
        assert_eq!(config.dtu.url, "http://192.168.1.10");
        assert_eq!(config.dtu.poll_interval_secs, 15);
        assert_eq!(config.dtu.max_failures, 3);
        assert_eq!(config.mqtt.broker_host, "localhost");
        assert_eq!(config.mqtt.broker_port, 1883);
        assert_eq!(config.mqtt.client_id, "inverter-property-bridge");
        assert_eq!(config.mqtt.base_topic, "webthings");
        assert_eq!(config.thing.description, "Solar inverter");
        assert_eq!(config.publisher, PublisherKind::Mqtt);
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("AHOY_DTU_URL", "http://ahoy.local"),
            ("AHOY_POLL_INTERVAL", "30"),
            ("MQTT_BROKER_PORT", "8883"),
            ("MQTT_USERNAME", "solar"),
            ("PUBLISHER", "LOG"),
        ]));
        assert_eq!(config.dtu.url, "http://ahoy.local");
        assert_eq!(config.dtu.poll_interval_secs, 30);
        assert_eq!(config.mqtt.broker_port, 8883);
        assert_eq!(config.mqtt.username.as_deref(), Some("solar"));
        assert_eq!(config.publisher, PublisherKind::Log);
    }

    #[test]
    fn test_invalid_numbers_keep_defaults() {
        let config = Config::from_lookup(lookup(&[
            ("AHOY_POLL_INTERVAL", "soon"),
            ("MQTT_BROKER_PORT", "99999"),
            ("PUBLISHER", "carrier-pigeon"),
        ]));
        assert_eq!(config.dtu.poll_interval_secs, 15);
        assert_eq!(config.mqtt.broker_port, 1883);
        assert_eq!(config.publisher, PublisherKind::Mqtt);
    }

    #[test]
    fn test_parse_dotenv() {
        let content = "# comment\n\nAHOY_DTU_URL=http://ahoy.local/?a=b\nTHING_DESCRIPTION = Roof array \nQUOTED=\"x y\"\nBARE\n";
        let pairs = parse_dotenv(content);
        assert_eq!(
            pairs,
            vec![
                ("AHOY_DTU_URL", "http://ahoy.local/?a=b"),
                ("THING_DESCRIPTION", "Roof array"),
                ("QUOTED", "x y"),
            ]
        );
    }
}
