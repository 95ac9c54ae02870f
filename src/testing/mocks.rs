//! Mock implementations for testing
//!
//! Provides a mock Transport so the dispatch loop can be tested
//! without a broker.

use crate::dispatch::InboundMessage;
use crate::error::GatewayError;
use crate::transport::{mqtt::ConnectionState, Transport};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Mock transport for testing
#[derive(Debug, Default)]
pub struct MockTransport {
    pub should_fail: bool,
    state: Arc<Mutex<Option<ConnectionState>>>,
    subscribed_count: Arc<Mutex<usize>>,
    message_sender: Arc<Mutex<Option<mpsc::Sender<InboundMessage>>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failure() -> Self {
        Self {
            should_fail: true,
            ..Default::default()
        }
    }

    /// Simulate a broker delivery: decode the payload and push it to
    /// the dispatch loop the way the event-loop task would.
    pub async fn inject_message(&self, topic: &str, payload: &[u8]) -> Result<(), GatewayError> {
        let sender = {
            let guard = self.message_sender.lock().expect("sender lock poisoned");
            guard.clone()
        };
        match sender {
            Some(sender) => sender
                .send(InboundMessage::from_raw(topic, payload))
                .await
                .map_err(|e| GatewayError::internal_error(e.to_string())),
            None => Err(GatewayError::internal_error(
                "no message sender configured",
            )),
        }
    }

    /// Force a given connection state, for health-monitoring tests.
    pub fn set_state(&self, state: ConnectionState) {
        *self.state.lock().expect("state lock poisoned") = Some(state);
    }

    pub fn subscribe_calls(&self) -> usize {
        *self.subscribed_count.lock().expect("count lock poisoned")
    }
}

#[async_trait]
impl Transport for MockTransport {
    type Error = GatewayError;

    async fn connect(&mut self) -> Result<(), Self::Error> {
        if self.should_fail {
            return Err(GatewayError::internal_error("mock connect failure"));
        }
        self.set_state(ConnectionState::Connected);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), Self::Error> {
        self.set_state(ConnectionState::Disconnected(
            "Client disconnected".to_string(),
        ));
        Ok(())
    }

    async fn subscribe_to_topics(&mut self) -> Result<(), Self::Error> {
        if !self.is_connected() {
            return Err(GatewayError::internal_error("not connected"));
        }
        *self
            .subscribed_count
            .lock()
            .expect("count lock poisoned") += 1;
        Ok(())
    }

    async fn set_message_sender(&self, sender: mpsc::Sender<InboundMessage>) {
        *self
            .message_sender
            .lock()
            .expect("sender lock poisoned") = Some(sender);
    }

    fn is_connected(&self) -> bool {
        matches!(
            *self.state.lock().expect("state lock poisoned"),
            Some(ConnectionState::Connected)
        )
    }

    fn connection_state(&self) -> Option<ConnectionState> {
        self.state.lock().expect("state lock poisoned").clone()
    }

    fn is_permanently_disconnected(&self) -> bool {
        matches!(
            *self.state.lock().expect("state lock poisoned"),
            Some(ConnectionState::PermanentlyDisconnected(_))
        )
    }
}
