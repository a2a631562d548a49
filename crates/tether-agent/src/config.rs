//! Agent configuration, loadable from TOML.

use serde::Deserialize;
use tether_core::{LogLevel, Qos};

/// Top-level configuration for the agent.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// IoT thing name of this device.
    pub thing_name: String,
    pub mqtt: MqttSettings,
    /// Topic filters subscribed once the connection is up.
    #[serde(default)]
    pub topics: Vec<String>,
    /// Subscription QoS as its wire value (0, 1 or 2).
    #[serde(default)]
    pub qos: Qos,
    /// Most verbose bridge diagnostic passed on to `tracing`.
    #[serde(default = "default_bridge_log_level")]
    pub bridge_log_level: LogLevel,
}

/// Connection settings. Certificate auth wins when both PEM paths are set,
/// otherwise username and password are used.
#[derive(Debug, Clone, Deserialize)]
pub struct MqttSettings {
    pub endpoint: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Generated when absent.
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default = "default_true")]
    pub clean_session: bool,
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u16,
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout_ms: u32,
    #[serde(default)]
    pub cert_path: Option<String>,
    #[serde(default)]
    pub key_path: Option<String>,
    #[serde(default)]
    pub ca_path: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_true")]
    pub use_tls: bool,
}

fn default_port() -> u16 {
    8883
}

fn default_true() -> bool {
    true
}

fn default_keep_alive() -> u16 {
    30
}

fn default_ping_timeout() -> u32 {
    3000
}

fn default_bridge_log_level() -> LogLevel {
    LogLevel::Info
}

impl AgentConfig {
    /// Load config from a TOML file path.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }
}

impl MqttSettings {
    /// The configured client id, or a fresh `tether-<uuid v7>`.
    pub fn resolved_client_id(&self) -> String {
        match &self.client_id {
            Some(id) if !id.is_empty() => id.clone(),
            _ => format!("tether-{}", uuid::Uuid::now_v7()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_minimal_config() {
        let toml = r#"
thing_name = "rpi-001"

[mqtt]
endpoint = "a1b2c3-ats.iot.us-east-1.amazonaws.com"
cert_path = "/etc/tether/cert.pem"
key_path = "/etc/tether/key.pem"
ca_path = "/etc/tether/AmazonRootCA1.pem"
"#;
        let config: AgentConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.thing_name, "rpi-001");
        assert_eq!(config.mqtt.port, 8883); // default
        assert_eq!(config.mqtt.keep_alive_secs, 30);
        assert_eq!(config.mqtt.ping_timeout_ms, 3000);
        assert!(config.mqtt.clean_session);
        assert!(config.mqtt.use_tls);
        assert!(config.mqtt.client_id.is_none());
        assert!(config.topics.is_empty());
        assert_eq!(config.qos, Qos::AtLeastOnce);
        assert_eq!(config.bridge_log_level, LogLevel::Info);
    }

    #[test]
    fn deserialize_full_config() {
        let toml = r#"
thing_name = "sbc-042"
topics = ["devices/sbc-042/cmd", "fleet/+/broadcast"]
qos = 0
bridge_log_level = "debug"

[mqtt]
endpoint = "localhost"
port = 1883
client_id = "sbc-042"
clean_session = false
keep_alive_secs = 60
ping_timeout_ms = 1500
username = "device"
password = "secret"
use_tls = false
"#;
        let config: AgentConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.topics.len(), 2);
        assert_eq!(config.qos, Qos::AtMostOnce);
        assert_eq!(config.bridge_log_level, LogLevel::Debug);
        assert_eq!(config.mqtt.port, 1883);
        assert_eq!(config.mqtt.keep_alive_secs, 60);
        assert_eq!(config.mqtt.username.as_deref(), Some("device"));
        assert!(!config.mqtt.clean_session);
        assert!(!config.mqtt.use_tls);
        assert_eq!(config.mqtt.resolved_client_id(), "sbc-042");
    }

    #[test]
    fn invalid_qos_is_rejected() {
        let toml = r#"
thing_name = "rpi-001"
qos = 3

[mqtt]
endpoint = "localhost"
"#;
        let err = toml::from_str::<AgentConfig>(toml).unwrap_err();
        assert!(err.to_string().contains("invalid MQTT QoS 3"), "{err}");
    }

    #[test]
    fn missing_client_id_is_generated() {
        let toml = r#"
thing_name = "rpi-001"

[mqtt]
endpoint = "localhost"
client_id = ""
"#;
        let config: AgentConfig = toml::from_str(toml).unwrap();
        let first = config.mqtt.resolved_client_id();
        let second = config.mqtt.resolved_client_id();
        assert!(first.starts_with("tether-"));
        assert_ne!(first, second);
    }

    #[test]
    fn from_file_reports_missing_file() {
        assert!(AgentConfig::from_file("/nonexistent/agent.toml").is_err());
    }
}
