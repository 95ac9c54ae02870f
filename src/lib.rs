//! GNSS Gateway
//!
//! A small MQTT gateway daemon. It connects to a broker, subscribes to
//! a set of topic filters, and maps each received payload to one
//! console action:
//!
//! - `ACTION1` → `[<topic>] Interrupt received: Do action 1`
//! - `ACTION2` → `[<topic>] Interrupt received: Do action 2`
//! - anything else → `[<topic>] Received unknown message: <payload>`
//!
//! Dispatch is exact-match, case-sensitive, and stateless: one output
//! line per message, nothing carried between messages.
//!
//! # Quick Start
//!
//! ```rust
//! use gnss_gateway::dispatch::{DispatchAction, Dispatcher};
//!
//! assert_eq!(Dispatcher::classify("ACTION1"), DispatchAction::Action1);
//! assert_eq!(
//!     Dispatcher::render_line("sensors/gnss", "ACTION1"),
//!     "[sensors/gnss] Interrupt received: Do action 1"
//! );
//! ```

pub mod config;
pub mod dispatch;
pub mod error;
pub mod observability;
pub mod testing;
pub mod transport;

pub use config::{GatewayConfig, MqttSection};
pub use dispatch::{DispatchAction, Dispatcher, InboundMessage};
pub use error::{GatewayError, GatewayResult};
pub use transport::mqtt::MqttClient;
pub use transport::Transport;
