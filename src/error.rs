//! Top-level error types for the GNSS gateway
//!
//! The dispatcher itself has no error path; everything here belongs to
//! the surrounding machinery (configuration, transport, startup).

use thiserror::Error;

/// Main error type for gateway operations
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Configuration error: {0}")]
    ConfigError(#[from] crate::config::ConfigError),

    #[error("Transport error: {0}")]
    TransportError(#[from] crate::transport::mqtt::MqttError),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Internal error: {message}")]
    InternalError { message: String },
}

impl GatewayError {
    /// Create internal error
    pub fn internal_error<S: Into<String>>(message: S) -> Self {
        Self::InternalError {
            message: message.into(),
        }
    }
}

/// Result type for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_internal_error_constructor() {
        let error = GatewayError::internal_error("unexpected state");
        assert!(matches!(error, GatewayError::InternalError { .. }));
        assert_eq!(error.to_string(), "Internal error: unexpected state");
    }

    #[test]
    fn test_transport_error_conversion() {
        let mqtt_err =
            crate::transport::mqtt::MqttError::ConnectionFailedStr("broker unreachable".to_string());
        let error: GatewayError = mqtt_err.into();
        assert!(matches!(error, GatewayError::TransportError(_)));
        assert!(error.to_string().contains("broker unreachable"));
    }

    #[test]
    fn test_config_error_conversion() {
        let config_err = crate::config::ConfigError::InvalidConfig("bad".to_string());
        let error: GatewayError = config_err.into();
        assert!(matches!(error, GatewayError::ConfigError(_)));
        assert!(error.to_string().contains("bad"));
    }
}
