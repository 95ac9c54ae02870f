//! Pure event routing for the MQTT transport
//!
//! Classifies rumqttc events into routes the client's supervisor acts
//! on, decodes publishes into [`InboundMessage`]s, and hands decoded
//! messages to the dispatch loop over a bounded channel.

use crate::dispatch::InboundMessage;
use rumqttc::v5::Event;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Routing decisions for MQTT events
#[derive(Debug, Clone)]
pub enum EventRoute {
    /// Connection acknowledged - ready to subscribe
    ConnectionAcknowledged,
    /// Message received on a subscribed topic
    MessageReceived {
        topic: String,
        payload: Vec<u8>,
        retain: bool,
    },
    /// Broker disconnected us
    Disconnected,
    /// Subscription confirmed
    SubscriptionConfirmed { packet_id: u16 },
    /// Infrastructure event (PingResp, etc.)
    InfrastructureEvent(String),
    /// Outgoing event (handled automatically)
    OutgoingEvent,
}

/// Pure event classification.
pub struct EventRouter;

impl EventRouter {
    /// Route an MQTT event to the appropriate handler (pure function).
    pub fn route_event(event: &Event) -> EventRoute {
        match event {
            Event::Incoming(incoming) => {
                use rumqttc::v5::mqttbytes::v5::Packet;
                match incoming {
                    Packet::ConnAck(_) => EventRoute::ConnectionAcknowledged,
                    Packet::Publish(publish) => EventRoute::MessageReceived {
                        topic: String::from_utf8_lossy(&publish.topic).to_string(),
                        payload: publish.payload.to_vec(),
                        retain: publish.retain,
                    },
                    Packet::Disconnect(_) => EventRoute::Disconnected,
                    Packet::SubAck(suback) => EventRoute::SubscriptionConfirmed {
                        packet_id: suback.pkid,
                    },
                    other => EventRoute::InfrastructureEvent(format!("{other:?}")),
                }
            }
            Event::Outgoing(_) => EventRoute::OutgoingEvent,
        }
    }

    /// Decode a received publish into an inbound message (pure
    /// function). Payload bytes go through lossy UTF-8 replacement.
    pub fn decode_message(topic: &str, payload: &[u8]) -> InboundMessage {
        InboundMessage::from_raw(topic, payload)
    }

    /// Check whether a topic matches one of the subscribed filters
    /// (pure function). Supports the `+` and `#` MQTT wildcards so the
    /// check agrees with what the broker delivers.
    pub fn topic_matches_filter(topic: &str, filter: &str) -> bool {
        let mut topic_levels = topic.split('/');
        let mut filter_levels = filter.split('/').peekable();

        loop {
            match (filter_levels.next(), topic_levels.next()) {
                (Some("#"), _) => return true,
                (Some("+"), Some(_)) => continue,
                (Some(f), Some(t)) if f == t => continue,
                (None, None) => return true,
                _ => return false,
            }
        }
    }

    /// Check whether a topic matches any subscribed filter.
    pub fn is_subscribed(topic: &str, filters: &[String]) -> bool {
        filters
            .iter()
            .any(|filter| Self::topic_matches_filter(topic, filter))
    }
}

/// Hand-off of decoded messages to the dispatch loop (impure I/O).
///
/// Replaces the callback the broker library would otherwise invoke:
/// the event-loop task pushes here, the dispatch loop receives.
pub struct MessageForwarder {
    message_sender: Option<mpsc::Sender<InboundMessage>>,
}

impl MessageForwarder {
    pub fn new() -> Self {
        Self {
            message_sender: None,
        }
    }

    pub fn set_message_sender(&mut self, sender: mpsc::Sender<InboundMessage>) {
        self.message_sender = Some(sender);
    }

    /// Forward a decoded message to the dispatch loop.
    pub async fn forward(&self, message: InboundMessage) -> Result<(), String> {
        if let Some(ref sender) = self.message_sender {
            debug!("Forwarding message on topic {} to dispatcher", message.topic);
            sender
                .send(message)
                .await
                .map_err(|e| format!("Failed to forward message to dispatcher: {e}"))?;
            Ok(())
        } else {
            warn!("Received MQTT message but no dispatch sender configured - message dropped");
            Err("No dispatch sender configured".to_string())
        }
    }
}

impl Default for MessageForwarder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{DispatchAction, Dispatcher};
    use rumqttc::v5::mqttbytes::v5::{ConnAck, ConnectReturnCode, Disconnect, Packet, Publish};
    use rumqttc::v5::mqttbytes::QoS;

    #[test]
    fn test_route_connack() {
        let connack = Event::Incoming(Packet::ConnAck(ConnAck {
            session_present: false,
            code: ConnectReturnCode::Success,
            properties: None,
        }));
        assert!(matches!(
            EventRouter::route_event(&connack),
            EventRoute::ConnectionAcknowledged
        ));
    }

    #[test]
    fn test_route_disconnect() {
        let disconnect = Event::Incoming(Packet::Disconnect(Disconnect {
            reason_code: rumqttc::v5::mqttbytes::v5::DisconnectReasonCode::NormalDisconnection,
            properties: None,
        }));
        assert!(matches!(
            EventRouter::route_event(&disconnect),
            EventRoute::Disconnected
        ));
    }

    #[test]
    fn test_route_publish() {
        let publish = Event::Incoming(Packet::Publish(Publish {
            dup: false,
            qos: QoS::AtMostOnce,
            retain: false,
            topic: "sensors/gnss".into(),
            pkid: 0,
            payload: "ACTION1".into(),
            properties: None,
        }));

        if let EventRoute::MessageReceived {
            topic,
            payload,
            retain,
        } = EventRouter::route_event(&publish)
        {
            assert_eq!(topic, "sensors/gnss");
            assert_eq!(payload, b"ACTION1");
            assert!(!retain);
        } else {
            panic!("Expected MessageReceived route");
        }
    }

    #[test]
    fn test_decode_message_feeds_dispatcher() {
        let msg = EventRouter::decode_message("sensors/gnss", b"ACTION1");
        assert_eq!(Dispatcher::classify(&msg.payload), DispatchAction::Action1);
    }

    #[test]
    fn test_decode_message_invalid_utf8() {
        let msg = EventRouter::decode_message("test/topic", &[0xC3, 0x28]);
        assert!(msg.payload.contains('\u{FFFD}'));
        assert_eq!(Dispatcher::classify(&msg.payload), DispatchAction::Unknown);
    }

    #[test]
    fn test_topic_matches_filter_exact() {
        assert!(EventRouter::topic_matches_filter(
            "sensors/gnss",
            "sensors/gnss"
        ));
        assert!(!EventRouter::topic_matches_filter(
            "sensors/imu",
            "sensors/gnss"
        ));
        assert!(!EventRouter::topic_matches_filter(
            "sensors/gnss/fix",
            "sensors/gnss"
        ));
    }

    #[test]
    fn test_topic_matches_filter_wildcards() {
        assert!(EventRouter::topic_matches_filter("sensors/gnss", "sensors/+"));
        assert!(EventRouter::topic_matches_filter(
            "sensors/gnss/fix",
            "sensors/#"
        ));
        assert!(!EventRouter::topic_matches_filter("other/gnss", "sensors/+"));
        assert!(!EventRouter::topic_matches_filter(
            "sensors/gnss/fix",
            "sensors/+"
        ));
    }

    #[test]
    fn test_is_subscribed() {
        let filters = vec!["test/topic".to_string(), "sensors/gnss".to_string()];
        assert!(EventRouter::is_subscribed("test/topic", &filters));
        assert!(EventRouter::is_subscribed("sensors/gnss", &filters));
        assert!(!EventRouter::is_subscribed("sensors/imu", &filters));
    }

    #[tokio::test]
    async fn test_message_forwarder() {
        let mut forwarder = MessageForwarder::new();
        let msg = InboundMessage::from_raw("test/topic", b"hello");

        // Should fail without a sender
        assert!(forwarder.forward(msg.clone()).await.is_err());

        let (tx, mut rx) = mpsc::channel(1);
        forwarder.set_message_sender(tx);

        assert!(forwarder.forward(msg.clone()).await.is_ok());

        let received = rx.recv().await.expect("message should arrive");
        assert_eq!(received.topic, "test/topic");
        assert_eq!(received.payload, "hello");
    }
}
