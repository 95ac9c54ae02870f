//! Gateway configuration
//!
//! TOML configuration with a `[gateway]` identity section and an
//! `[mqtt]` broker section. The subscription topics default to the two
//! filters the GNSS deployment uses and are fixed for the lifetime of
//! the process.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Top-level gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GatewayConfig {
    pub gateway: GatewaySection,
    pub mqtt: MqttSection,
}

/// Gateway identity section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GatewaySection {
    /// Gateway identifier (must match [a-zA-Z0-9._-]+), used to build
    /// the MQTT client id
    pub id: String,
    /// Description of this gateway instance
    #[serde(default)]
    pub description: String,
}

/// MQTT broker section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MqttSection {
    /// Broker URL, `mqtt://host[:port]` (port defaults to 1883)
    pub broker_url: String,
    /// Topic filters subscribed once at startup
    #[serde(default = "default_topics")]
    pub topics: Vec<String>,
    /// Keep-alive interval in seconds
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
}

fn default_topics() -> Vec<String> {
    vec!["test/topic".to_string(), "sensors/gnss".to_string()]
}

fn default_keep_alive_secs() -> u64 {
    60
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Invalid gateway ID format: {0}")]
    InvalidGatewayId(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl GatewayConfig {
    /// Load configuration from a TOML file and validate it.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: GatewayConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate identity and subscription settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_gateway_id(&self.gateway.id)?;

        if self.mqtt.topics.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "at least one subscription topic is required".to_string(),
            ));
        }
        for topic in &self.mqtt.topics {
            if topic.is_empty() {
                return Err(ConfigError::InvalidConfig(
                    "subscription topics must be non-empty".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Create a test configuration for unit testing
    #[cfg(test)]
    pub fn test_config() -> Self {
        let toml_content = r#"
[gateway]
id = "test-gateway"
description = "A test gateway"

[mqtt]
broker_url = "mqtt://localhost:1883"
"#;
        toml::from_str(toml_content).expect("Test config should parse")
    }
}

/// Validate gateway ID format
fn validate_gateway_id(gateway_id: &str) -> Result<(), ConfigError> {
    let valid_chars = gateway_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-');

    if gateway_id.is_empty() || !valid_chars {
        return Err(ConfigError::InvalidGatewayId(format!(
            "Gateway ID '{gateway_id}' must match pattern [a-zA-Z0-9._-]+"
        )));
    }

    Ok(())
}
