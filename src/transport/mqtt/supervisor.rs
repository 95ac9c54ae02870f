//! Pure reconnection and state-transition logic for the MQTT client

use super::connection::{ConnectionState, ReconnectConfig};
use std::time::Duration;
use tracing::{error, info};

/// Decision result for reconnection attempts
#[derive(Debug, PartialEq)]
pub enum ReconnectionDecision {
    /// Proceed with reconnection attempt
    Proceed { attempt: u32, delay_ms: u64 },
    /// Abort reconnection - shutdown requested
    AbortShutdownRequested,
    /// Abort reconnection - max attempts exceeded
    AbortMaxAttemptsExceeded,
}

/// Connection events that trigger state transitions
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// ConnAck received from broker
    ConnAckReceived,
    /// Broker initiated disconnect
    DisconnectedByBroker,
    /// Network or protocol error
    NetworkError(String),
    /// Reconnection attempt started
    ReconnectionStarted(u32),
    /// Permanent failure - no more retries
    PermanentFailure(String),
}

/// Pure supervision decisions for the connection task.
pub struct ConnectionSupervisor;

impl ConnectionSupervisor {
    /// Decide whether another reconnection attempt should be made
    /// (pure function). Unlimited retries when max_attempts is None.
    pub fn should_attempt_reconnection(
        current_attempts: u32,
        config: &ReconnectConfig,
        shutdown_requested: bool,
    ) -> ReconnectionDecision {
        if shutdown_requested {
            return ReconnectionDecision::AbortShutdownRequested;
        }

        if let Some(max_attempts) = config.max_attempts {
            if current_attempts >= max_attempts {
                return ReconnectionDecision::AbortMaxAttemptsExceeded;
            }
        }

        let delay_ms = config.calculate_backoff_delay(current_attempts + 1);
        ReconnectionDecision::Proceed {
            attempt: current_attempts + 1,
            delay_ms,
        }
    }

    /// Connection timeout for the initial ConnAck wait (pure function).
    pub fn calculate_connection_timeout(config: &ReconnectConfig) -> Duration {
        match config.calculate_max_total_time() {
            Some(max_total_time) => Duration::from_millis(max_total_time + 30000),
            None => Duration::from_secs(60),
        }
    }

    /// Next connection state after an event (pure function).
    pub fn determine_next_state(event: ConnectionEvent) -> ConnectionState {
        match event {
            ConnectionEvent::ConnAckReceived => {
                info!("MQTT client connected successfully");
                ConnectionState::Connected
            }
            ConnectionEvent::DisconnectedByBroker => {
                info!("MQTT broker disconnected gateway");
                ConnectionState::Disconnected("Broker disconnected".to_string())
            }
            ConnectionEvent::NetworkError(error) => {
                error!("MQTT event loop error: {}", error);
                ConnectionState::Disconnected(error)
            }
            ConnectionEvent::ReconnectionStarted(attempt) => {
                info!("Starting reconnection attempt {}", attempt);
                ConnectionState::Reconnecting(attempt)
            }
            ConnectionEvent::PermanentFailure(reason) => {
                error!("Permanent connection failure: {}", reason);
                ConnectionState::PermanentlyDisconnected(reason)
            }
        }
    }

    /// Check if the connection state allows subscribing (pure function).
    pub fn can_subscribe(state: &ConnectionState) -> bool {
        matches!(state, ConnectionState::Connected)
    }
}
