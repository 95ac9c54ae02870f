//! Impure I/O operations for the MQTT client
//!
//! Owns the rumqttc client and event loop, runs the event-loop task
//! with its reconnection supervisor, and hands received messages to
//! the dispatch loop.

use super::connection::{configure_mqtt_options, ConnectionState, MqttError, ReconnectConfig};
use super::event::{EventRoute, EventRouter, MessageForwarder};
use super::supervisor::{ConnectionEvent, ConnectionSupervisor, ReconnectionDecision};
use crate::config::MqttSection;
use crate::dispatch::InboundMessage;
use crate::transport::Transport;
use async_trait::async_trait;
use rumqttc::v5::mqttbytes::QoS;
use rumqttc::v5::{AsyncClient, EventLoop};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// MQTT transport client for the GNSS gateway.
///
/// The broker connection is an explicitly owned handle: created at
/// startup, polled by a spawned task, shut down through a watch
/// channel. No process-global state.
pub struct MqttClient {
    gateway_id: String,
    client: Arc<Mutex<AsyncClient>>,
    event_loop: Option<Arc<Mutex<EventLoop>>>,
    config: MqttSection,
    event_loop_handle: Option<JoinHandle<()>>,
    state_rx: Option<watch::Receiver<ConnectionState>>,
    state_tx: Option<watch::Sender<ConnectionState>>,
    shutdown_tx: Option<watch::Sender<bool>>,
    reconnect_config: ReconnectConfig,
    message_forwarder: Arc<Mutex<MessageForwarder>>,
}

impl MqttClient {
    pub fn new(gateway_id: &str, config: MqttSection) -> Result<Self, MqttError> {
        let mqtt_options = configure_mqtt_options(gateway_id, &config)?;
        let (client, event_loop) = AsyncClient::new(mqtt_options, 10);

        Ok(MqttClient {
            gateway_id: gateway_id.to_string(),
            client: Arc::new(Mutex::new(client)),
            event_loop: Some(Arc::new(Mutex::new(event_loop))),
            config,
            event_loop_handle: None,
            state_rx: None,
            state_tx: None,
            shutdown_tx: None,
            reconnect_config: ReconnectConfig::default(),
            message_forwarder: Arc::new(Mutex::new(MessageForwarder::new())),
        })
    }

    /// Set the channel the dispatch loop receives messages on.
    pub async fn set_message_sender(&self, sender: mpsc::Sender<InboundMessage>) {
        let mut forwarder = self.message_forwarder.lock().await;
        forwarder.set_message_sender(sender);
    }

    /// Create a fresh client and event loop, used for reconnection
    /// attempts.
    fn create_connection(
        gateway_id: &str,
        config: &MqttSection,
    ) -> Result<(AsyncClient, EventLoop), MqttError> {
        let mqtt_options = configure_mqtt_options(gateway_id, config)?;
        let (client, event_loop) = AsyncClient::new(mqtt_options, 10);
        Ok((client, event_loop))
    }

    /// Create connection state and shutdown channels.
    #[allow(clippy::type_complexity)]
    fn setup_connection_channels() -> (
        (
            watch::Sender<ConnectionState>,
            watch::Receiver<ConnectionState>,
        ),
        (watch::Sender<bool>, watch::Receiver<bool>),
    ) {
        let state_channels = watch::channel(ConnectionState::Connecting);
        let shutdown_channels = watch::channel(false);
        (state_channels, shutdown_channels)
    }

    /// Wait for connection confirmation (ConnAck) with a timeout.
    async fn wait_for_connection_confirmation(
        mut state_rx: watch::Receiver<ConnectionState>,
        timeout: Duration,
    ) -> Result<(), MqttError> {
        let timeout_result = tokio::time::timeout(timeout, async {
            loop {
                if state_rx.changed().await.is_err() {
                    return Err(MqttError::ConnectionFailedStr(
                        "State channel closed".to_string(),
                    ));
                }
                match *state_rx.borrow() {
                    ConnectionState::Connected => return Ok(()),
                    ConnectionState::Disconnected(ref reason) => {
                        return Err(MqttError::ConnectionFailedStr(reason.clone()));
                    }
                    ConnectionState::PermanentlyDisconnected(ref reason) => {
                        return Err(MqttError::ConnectionFailedStr(format!(
                            "Permanently disconnected: {reason}"
                        )));
                    }
                    ConnectionState::Connecting | ConnectionState::Reconnecting(_) => continue,
                }
            }
        })
        .await;

        match timeout_result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(MqttError::ConnectionFailedStr(
                "ConnAck timeout - no connection confirmation received".to_string(),
            )),
        }
    }

    /// Connect to the broker. Returns only once a ConnAck has been
    /// received, or fails after the connection timeout.
    pub async fn connect(&mut self) -> Result<(), MqttError> {
        let event_loop = self.event_loop.take().ok_or_else(|| {
            MqttError::ConnectionFailedStr("Event loop already started".to_string())
        })?;

        let ((state_tx, state_rx), (shutdown_tx, mut shutdown_rx)) =
            Self::setup_connection_channels();
        self.state_rx = Some(state_rx.clone());
        self.state_tx = Some(state_tx.clone());
        self.shutdown_tx = Some(shutdown_tx);

        let gateway_id = self.gateway_id.clone();
        let config = self.config.clone();
        let shared_client = self.client.clone();
        let reconnect_config = self.reconnect_config.clone();
        let message_forwarder = self.message_forwarder.clone();

        let handle = tokio::spawn(async move {
            info!(
                "Starting MQTT event loop with reconnection supervisor for gateway: {}",
                gateway_id
            );
            let mut reconnect_attempts = 0u32;
            let mut current_event_loop = event_loop;

            loop {
                tokio::select! {
                    // Shutdown signal has priority over event processing
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            info!("Shutdown signal received, stopping reconnection supervisor");
                            break;
                        }
                    }

                    event_result = async {
                        let mut event_loop_guard = current_event_loop.lock().await;
                        event_loop_guard.poll().await
                    } => {
                        let keep_running = match event_result {
                            Ok(event) => {
                                let route = EventRouter::route_event(&event);
                                Self::process_event_route(
                                    route,
                                    &state_tx,
                                    &mut reconnect_attempts,
                                    &shared_client,
                                    &message_forwarder,
                                    &gateway_id,
                                    &config,
                                    &reconnect_config,
                                    shutdown_rx.clone(),
                                    &mut current_event_loop,
                                ).await
                            }
                            Err(e) => {
                                let _ = state_tx.send(ConnectionSupervisor::determine_next_state(
                                    ConnectionEvent::NetworkError(e.to_string()),
                                ));
                                error!("MQTT event loop error for gateway {}: {}", gateway_id, e);

                                Self::attempt_reconnection(
                                    &mut reconnect_attempts,
                                    &reconnect_config,
                                    shutdown_rx.clone(),
                                    &state_tx,
                                    &mut current_event_loop,
                                    &gateway_id,
                                    &config,
                                    &shared_client,
                                ).await
                            }
                        };
                        if !keep_running {
                            break;
                        }
                    }
                }
            }
            info!("MQTT event loop stopped for gateway: {}", gateway_id);
        });

        self.event_loop_handle = Some(handle);

        let connection_timeout =
            ConnectionSupervisor::calculate_connection_timeout(&self.reconnect_config);
        Self::wait_for_connection_confirmation(state_rx, connection_timeout).await?;

        Ok(())
    }

    /// Act on a routed event. Returns true to continue the loop.
    #[allow(clippy::too_many_arguments)]
    async fn process_event_route(
        route: EventRoute,
        state_tx: &watch::Sender<ConnectionState>,
        reconnect_attempts: &mut u32,
        shared_client: &Arc<Mutex<AsyncClient>>,
        message_forwarder: &Arc<Mutex<MessageForwarder>>,
        gateway_id: &str,
        config: &MqttSection,
        reconnect_config: &ReconnectConfig,
        shutdown_rx: watch::Receiver<bool>,
        current_event_loop: &mut Arc<Mutex<EventLoop>>,
    ) -> bool {
        match route {
            EventRoute::ConnectionAcknowledged => {
                let _ = state_tx.send(ConnectionSupervisor::determine_next_state(
                    ConnectionEvent::ConnAckReceived,
                ));
                // Re-subscribe after every (re)connect; the initial
                // subscribe call is idempotent against this
                if *reconnect_attempts > 0 {
                    Self::resubscribe_to_topics(shared_client, &config.topics).await;
                }
                *reconnect_attempts = 0;
                true
            }
            EventRoute::MessageReceived {
                topic,
                payload,
                retain,
            } => {
                Self::handle_message_received(
                    message_forwarder,
                    &config.topics,
                    &topic,
                    &payload,
                    retain,
                )
                .await;
                true
            }
            EventRoute::Disconnected => {
                let _ = state_tx.send(ConnectionSupervisor::determine_next_state(
                    ConnectionEvent::DisconnectedByBroker,
                ));
                Self::attempt_reconnection(
                    reconnect_attempts,
                    reconnect_config,
                    shutdown_rx,
                    state_tx,
                    current_event_loop,
                    gateway_id,
                    config,
                    shared_client,
                )
                .await
            }
            EventRoute::SubscriptionConfirmed { packet_id } => {
                debug!(target: "mqtt_transport", "Subscription confirmed: pkid={}", packet_id);
                true
            }
            EventRoute::InfrastructureEvent(event_str) => {
                debug!(target: "mqtt_transport", "MQTT event: {}", event_str);
                true
            }
            EventRoute::OutgoingEvent => true,
        }
    }

    /// Decode a received publish and forward it to the dispatch loop.
    /// Deliveries outside the subscribed filters are dropped; a shared
    /// broker connection can carry topics this gateway never asked for.
    async fn handle_message_received(
        message_forwarder: &Arc<Mutex<MessageForwarder>>,
        topics: &[String],
        topic: &str,
        payload: &[u8],
        retain: bool,
    ) {
        if !EventRouter::is_subscribed(topic, topics) {
            warn!("Dropping message on unsubscribed topic: {}", topic);
            return;
        }

        let message = EventRouter::decode_message(topic, payload);
        debug!(
            target: "mqtt_transport",
            "Received MQTT message on topic: {} (retain={}, received_at={})",
            topic, retain, message.received_at
        );
        let forwarder_guard = message_forwarder.lock().await;
        if let Err(e) = forwarder_guard.forward(message).await {
            error!("Failed to forward message: {}", e);
        }
    }

    /// Sleep that can be interrupted by the shutdown signal. Returns
    /// false if shutdown was requested.
    async fn interruptible_sleep(mut shutdown_rx: watch::Receiver<bool>, delay_ms: u64) -> bool {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    info!("Shutdown signal received during reconnection delay, stopping");
                    return false;
                }
                true
            }
            _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => {
                true
            }
        }
    }

    /// Swap in a fresh connection after a reconnection delay. Returns
    /// true in both outcomes so the supervisor keeps trying.
    async fn apply_new_connection(
        gateway_id: &str,
        config: &MqttSection,
        current_event_loop: &mut Arc<Mutex<EventLoop>>,
        shared_client: &Arc<Mutex<AsyncClient>>,
    ) -> bool {
        match Self::create_connection(gateway_id, config) {
            Ok((new_client, new_event_loop)) => {
                info!("Created new connection for reconnection attempt");
                *current_event_loop = Arc::new(Mutex::new(new_event_loop));
                let mut client_guard = shared_client.lock().await;
                *client_guard = new_client;
                true
            }
            Err(e) => {
                error!("Failed to create new connection: {}", e);
                true
            }
        }
    }

    /// Re-establish the configured subscriptions after a reconnect.
    async fn resubscribe_to_topics(client: &Arc<Mutex<AsyncClient>>, topics: &[String]) {
        let client_guard = client.lock().await;
        for topic in topics {
            if let Err(e) = client_guard.subscribe(topic, QoS::AtMostOnce).await {
                error!("Failed to re-subscribe to {}: {}", topic, e);
            } else {
                debug!(target: "mqtt_transport", "Re-subscribed to: {}", topic);
            }
        }
    }

    /// Run one reconnection round. Returns true to continue the loop.
    #[allow(clippy::too_many_arguments)]
    async fn attempt_reconnection(
        reconnect_attempts: &mut u32,
        reconnect_config: &ReconnectConfig,
        shutdown_rx: watch::Receiver<bool>,
        state_tx: &watch::Sender<ConnectionState>,
        current_event_loop: &mut Arc<Mutex<EventLoop>>,
        gateway_id: &str,
        config: &MqttSection,
        shared_client: &Arc<Mutex<AsyncClient>>,
    ) -> bool {
        let decision = ConnectionSupervisor::should_attempt_reconnection(
            *reconnect_attempts,
            reconnect_config,
            *shutdown_rx.borrow(),
        );

        match decision {
            ReconnectionDecision::Proceed { attempt, delay_ms } => {
                *reconnect_attempts = attempt;
                let _ = state_tx.send(ConnectionSupervisor::determine_next_state(
                    ConnectionEvent::ReconnectionStarted(attempt),
                ));

                let max_display = reconnect_config
                    .max_attempts
                    .map_or("unlimited".to_string(), |max| max.to_string());
                info!(
                    "Attempting reconnection {}/{} after {}ms delay",
                    attempt, max_display, delay_ms
                );

                if !Self::interruptible_sleep(shutdown_rx.clone(), delay_ms).await {
                    return false;
                }
                if *shutdown_rx.borrow() {
                    info!("Shutdown signal received, aborting reconnection");
                    return false;
                }

                Self::apply_new_connection(gateway_id, config, current_event_loop, shared_client)
                    .await
            }
            ReconnectionDecision::AbortShutdownRequested => {
                info!("Shutdown signal received, stopping reconnection");
                false
            }
            ReconnectionDecision::AbortMaxAttemptsExceeded => {
                let reason = format!(
                    "Max reconnection attempts ({}) exceeded",
                    reconnect_config.max_attempts.unwrap_or(0)
                );
                let _ = state_tx.send(ConnectionSupervisor::determine_next_state(
                    ConnectionEvent::PermanentFailure(reason),
                ));
                false
            }
        }
    }

    /// Disconnect from the broker and wind down the event-loop task.
    pub async fn disconnect(&mut self) -> Result<(), MqttError> {
        if let Some(shutdown_tx) = &self.shutdown_tx {
            let _ = shutdown_tx.send(true);
            info!("Sent shutdown signal to reconnection supervisor");
        }

        let client = self.client.lock().await;
        client
            .disconnect()
            .await
            .map_err(|e| MqttError::ConnectionFailed(Box::new(e)))?;
        drop(client);

        if let Some(state_tx) = &self.state_tx {
            let _ = state_tx.send(ConnectionState::Disconnected(
                "Client disconnected".to_string(),
            ));
        }

        if let Some(handle) = self.event_loop_handle.take() {
            let graceful_shutdown = tokio::time::timeout(Duration::from_secs(2), handle).await;
            match graceful_shutdown {
                Ok(Ok(())) => {
                    info!("Event loop task shut down gracefully");
                }
                Ok(Err(e)) if !e.is_cancelled() => {
                    warn!("Event loop task ended with error: {}", e);
                }
                Err(_) => {
                    warn!("Event loop task didn't shut down gracefully, forcing abort");
                }
                _ => {}
            }
        }

        info!("MQTT client disconnected");
        Ok(())
    }

    /// Current connection state, or None before connect().
    pub fn connection_state(&self) -> Option<ConnectionState> {
        self.state_rx.as_ref().map(|rx| rx.borrow().clone())
    }

    /// Check if the connection is permanently disconnected.
    pub fn is_permanently_disconnected(&self) -> bool {
        matches!(
            self.connection_state(),
            Some(ConnectionState::PermanentlyDisconnected(_))
        )
    }

    /// Subscribe to the configured topic filters, once, after connect.
    pub async fn subscribe_to_topics(&mut self) -> Result<(), MqttError> {
        if let Some(state_rx) = &self.state_rx {
            let current_state = state_rx.borrow().clone();
            if !ConnectionSupervisor::can_subscribe(&current_state) {
                return Err(MqttError::NotConnected {
                    state: current_state,
                });
            }
        } else {
            return Err(MqttError::ConnectionFailedStr(
                "Client not connected".to_string(),
            ));
        }

        let client = self.client.lock().await;
        for topic in &self.config.topics {
            info!("Subscribing to topic: {}", topic);
            client
                .subscribe(topic, QoS::AtMostOnce)
                .await
                .map_err(|e| {
                    MqttError::SubscriptionFailed(
                        format!("Failed to subscribe to {topic}: {e}").into(),
                    )
                })?;
        }

        info!(
            "Successfully subscribed to {} topic(s)",
            self.config.topics.len()
        );
        Ok(())
    }
}

#[async_trait]
impl Transport for MqttClient {
    type Error = MqttError;

    async fn connect(&mut self) -> Result<(), Self::Error> {
        MqttClient::connect(self).await
    }

    async fn disconnect(&mut self) -> Result<(), Self::Error> {
        MqttClient::disconnect(self).await
    }

    async fn subscribe_to_topics(&mut self) -> Result<(), Self::Error> {
        MqttClient::subscribe_to_topics(self).await
    }

    async fn set_message_sender(&self, sender: mpsc::Sender<InboundMessage>) {
        MqttClient::set_message_sender(self, sender).await;
    }

    fn is_connected(&self) -> bool {
        matches!(self.connection_state(), Some(ConnectionState::Connected))
    }

    fn connection_state(&self) -> Option<ConnectionState> {
        MqttClient::connection_state(self)
    }

    fn is_permanently_disconnected(&self) -> bool {
        MqttClient::is_permanently_disconnected(self)
    }
}

impl Drop for MqttClient {
    fn drop(&mut self) {
        // Can't do async work in Drop; signal shutdown and abort the
        // background task. Callers wanting a graceful shutdown use
        // disconnect() explicitly.
        if let Some(shutdown_tx) = &self.shutdown_tx {
            let _ = shutdown_tx.send(true);
        }
        if let Some(handle) = self.event_loop_handle.take() {
            handle.abort();
        }
    }
}
