//! Message dispatch for the GNSS gateway
//!
//! Maps every received (topic, payload) pair to exactly one console
//! action. Matching is exact, case-sensitive, first-match, and carries
//! no state between invocations.

use chrono::{DateTime, Utc};

/// A single message delivered by the broker.
///
/// Transient: created when a publish arrives, consumed once by the
/// dispatch loop, never persisted. Payload bytes are decoded with lossy
/// UTF-8 replacement before this type is constructed, so `payload` is
/// always valid text.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: String,
    pub received_at: DateTime<Utc>,
}

impl InboundMessage {
    /// Decode a raw broker delivery. Non-UTF-8 bytes are replaced with
    /// U+FFFD, which then fall through the dispatcher's default branch.
    pub fn from_raw(topic: &str, payload: &[u8]) -> Self {
        Self {
            topic: topic.to_string(),
            payload: String::from_utf8_lossy(payload).to_string(),
            received_at: Utc::now(),
        }
    }
}

/// The three observable outcomes of dispatching a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchAction {
    /// Payload was exactly `ACTION1`
    Action1,
    /// Payload was exactly `ACTION2`
    Action2,
    /// Any other payload
    Unknown,
}

/// Pure dispatch logic.
pub struct Dispatcher;

impl Dispatcher {
    /// Classify a payload (pure function). First-match order, exact
    /// case-sensitive comparison against the two action literals.
    pub fn classify(payload: &str) -> DispatchAction {
        if payload == "ACTION1" {
            DispatchAction::Action1
        } else if payload == "ACTION2" {
            DispatchAction::Action2
        } else {
            DispatchAction::Unknown
        }
    }

    /// Produce the single output line for a message (pure function).
    ///
    /// This is the gateway's entire observable contract: one line per
    /// message, no other side effects.
    pub fn render_line(topic: &str, payload: &str) -> String {
        match Self::classify(payload) {
            DispatchAction::Action1 => {
                format!("[{topic}] Interrupt received: Do action 1")
            }
            DispatchAction::Action2 => {
                format!("[{topic}] Interrupt received: Do action 2")
            }
            DispatchAction::Unknown => {
                format!("[{topic}] Received unknown message: {payload}")
            }
        }
    }

    /// Dispatch a message: render its line and report the action taken.
    pub fn dispatch(message: &InboundMessage) -> (DispatchAction, String) {
        let action = Self::classify(&message.payload);
        let line = Self::render_line(&message.topic, &message.payload);
        (action, line)
    }
}
