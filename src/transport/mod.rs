//! Transport layer for broker communication
//!
//! Provides the transport abstraction and its MQTT implementation.

use crate::dispatch::InboundMessage;
use tokio::sync::mpsc;

pub mod mqtt;

/// Transport trait for broker communication
///
/// Abstraction over the broker connection so the dispatch loop can be
/// driven by a mock in tests.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Connect to the broker; returns once the connection is confirmed
    async fn connect(&mut self) -> Result<(), Self::Error>;

    /// Disconnect from the broker
    async fn disconnect(&mut self) -> Result<(), Self::Error>;

    /// Subscribe to the configured topic filters
    async fn subscribe_to_topics(&mut self) -> Result<(), Self::Error>;

    /// Set the channel receiving decoded inbound messages
    async fn set_message_sender(&self, sender: mpsc::Sender<InboundMessage>);

    /// Check if the transport is currently connected
    fn is_connected(&self) -> bool;

    /// Get the current connection state
    fn connection_state(&self) -> Option<mqtt::ConnectionState>;

    /// Check if the connection is permanently disconnected
    fn is_permanently_disconnected(&self) -> bool;
}

/// Type alias for the MQTT transport
pub type MqttTransport = mqtt::MqttClient;
