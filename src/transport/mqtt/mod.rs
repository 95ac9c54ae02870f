//! MQTT transport implementation for the GNSS gateway
//!
//! Split between pure logic and impure I/O:
//!
//! - `connection` - connection state machine, reconnect configuration,
//!   broker option construction
//! - `event` - event routing, payload decoding, channel hand-off
//! - `supervisor` - reconnection decisions and state transitions
//! - `client` - the rumqttc client, event-loop task, and supervision
//!   loop

pub mod client;
pub mod connection;
pub mod event;
pub mod supervisor;

pub use client::MqttClient;
pub use connection::{ConnectionState, MqttError, ReconnectConfig};
pub use event::{EventRoute, EventRouter, MessageForwarder};
pub use supervisor::{ConnectionEvent, ConnectionSupervisor, ReconnectionDecision};
