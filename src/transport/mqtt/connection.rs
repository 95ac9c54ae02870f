//! Pure connection state management for the MQTT transport
//!
//! Connection state machine, reconnection configuration, and broker
//! option construction.

use crate::config::MqttSection;
use rumqttc::v5::MqttOptions;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Connection state for the MQTT client
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    /// Initial state - attempting to connect
    Connecting,
    /// Successfully connected and ready for operations
    Connected,
    /// Disconnected with reason
    Disconnected(String),
    /// Attempting to reconnect (attempt count)
    Reconnecting(u32),
    /// Permanently disconnected - max reconnection attempts exceeded
    PermanentlyDisconnected(String),
}

/// Reconnection configuration
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Maximum number of reconnection attempts (None = unlimited)
    pub max_attempts: Option<u32>,
    /// Backoff pattern in milliseconds
    pub backoff_pattern: Vec<u64>,
    /// Delay to use after the pattern is exhausted
    pub sustained_delay: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: None,
            backoff_pattern: vec![250, 500, 1000, 2000],
            sustained_delay: 5000,
        }
    }
}

impl ReconnectConfig {
    /// Total time for all attempts, or None when retries are unlimited.
    pub fn calculate_max_total_time(&self) -> Option<u64> {
        self.max_attempts.map(|max_attempts| {
            (1..=max_attempts)
                .map(|attempt| self.calculate_backoff_delay(attempt))
                .sum()
        })
    }

    /// Backoff delay for the given attempt, sustaining the final delay
    /// once the pattern is exhausted.
    pub fn calculate_backoff_delay(&self, attempt: u32) -> u64 {
        let index = (attempt.saturating_sub(1)) as usize;
        match self.backoff_pattern.get(index) {
            Some(delay) => *delay,
            None => self.sustained_delay,
        }
    }
}

/// MQTT transport errors
#[derive(Debug, Error)]
pub enum MqttError {
    #[error("Connection failed")]
    ConnectionFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Subscription failed")]
    SubscriptionFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Invalid broker URL: {0}")]
    InvalidBrokerUrl(String),
    #[error("Not connected - current state: {state:?}")]
    NotConnected { state: ConnectionState },
    #[error("Connection failed: {0}")]
    ConnectionFailedStr(String),
}

/// Build MQTT options from configuration. Shared between the initial
/// connection and reconnection attempts.
pub fn configure_mqtt_options(
    gateway_id: &str,
    config: &MqttSection,
) -> Result<MqttOptions, MqttError> {
    let url = Url::parse(&config.broker_url)
        .map_err(|_| MqttError::InvalidBrokerUrl(config.broker_url.clone()))?;

    if url.scheme() != "mqtt" {
        return Err(MqttError::InvalidBrokerUrl(format!(
            "{} (only mqtt:// is supported)",
            config.broker_url
        )));
    }

    let host = url
        .host_str()
        .ok_or_else(|| MqttError::InvalidBrokerUrl(config.broker_url.clone()))?;
    let port = url.port().unwrap_or(1883);

    // Unique client id per connection attempt to prevent broker-side
    // session conflicts
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_err(|e| MqttError::ConnectionFailedStr(e.to_string()))?
        .as_millis();
    let client_id = format!("gateway-{gateway_id}-{timestamp}");

    let mut mqtt_options = MqttOptions::new(client_id, host, port);
    mqtt_options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));

    Ok(mqtt_options)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_mqtt_config() -> MqttSection {
        MqttSection {
            broker_url: "mqtt://localhost:1883".to_string(),
            topics: vec!["test/topic".to_string(), "sensors/gnss".to_string()],
            keep_alive_secs: 60,
        }
    }

    #[test]
    fn test_reconnect_config_default() {
        let config = ReconnectConfig::default();
        assert_eq!(config.max_attempts, None); // Unlimited by default
        assert_eq!(config.backoff_pattern, vec![250, 500, 1000, 2000]);
        assert_eq!(config.sustained_delay, 5000);
    }

    #[test]
    fn test_calculate_backoff_delay() {
        let config = ReconnectConfig::default();

        assert_eq!(config.calculate_backoff_delay(1), 250);
        assert_eq!(config.calculate_backoff_delay(2), 500);
        assert_eq!(config.calculate_backoff_delay(3), 1000);
        assert_eq!(config.calculate_backoff_delay(4), 2000);

        // Sustained delay after the pattern is exhausted
        assert_eq!(config.calculate_backoff_delay(5), 5000);
        assert_eq!(config.calculate_backoff_delay(100), 5000);
    }

    #[test]
    fn test_calculate_max_total_time() {
        let config = ReconnectConfig {
            max_attempts: Some(4),
            backoff_pattern: vec![250, 500, 1000, 2000],
            sustained_delay: 5000,
        };
        assert_eq!(config.calculate_max_total_time(), Some(3750));

        let unlimited = ReconnectConfig::default();
        assert_eq!(unlimited.calculate_max_total_time(), None);
    }

    #[test]
    fn test_configure_mqtt_options() {
        let config = test_mqtt_config();
        let options = configure_mqtt_options("test-gateway", &config);
        assert!(options.is_ok());
    }

    #[test]
    fn test_default_port() {
        let mut config = test_mqtt_config();
        config.broker_url = "mqtt://192.168.1.16".to_string();
        assert!(configure_mqtt_options("test-gateway", &config).is_ok());
    }

    #[test]
    fn test_invalid_broker_url() {
        let mut config = test_mqtt_config();
        config.broker_url = "invalid-url".to_string();
        let result = configure_mqtt_options("test-gateway", &config);
        assert!(matches!(result, Err(MqttError::InvalidBrokerUrl(_))));
    }

    #[test]
    fn test_unsupported_scheme_rejected() {
        let mut config = test_mqtt_config();
        config.broker_url = "mqtts://localhost:8883".to_string();
        let result = configure_mqtt_options("test-gateway", &config);
        assert!(matches!(result, Err(MqttError::InvalidBrokerUrl(_))));
    }

    #[test]
    fn test_connection_state_equality() {
        assert_eq!(ConnectionState::Connected, ConnectionState::Connected);
        assert_eq!(
            ConnectionState::Disconnected("test".to_string()),
            ConnectionState::Disconnected("test".to_string())
        );
        assert_ne!(
            ConnectionState::Connected,
            ConnectionState::Disconnected("test".to_string())
        );
    }

    #[test]
    fn test_mqtt_error_display() {
        let errors = vec![
            MqttError::InvalidBrokerUrl("test".to_string()),
            MqttError::NotConnected {
                state: ConnectionState::Disconnected("test".to_string()),
            },
            MqttError::ConnectionFailedStr("test".to_string()),
        ];

        for error in errors {
            assert!(!error.to_string().is_empty());
        }
    }
}
