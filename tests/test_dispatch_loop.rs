//! Dispatch loop behavior tests
//!
//! Exercises the channel hand-off from the transport to the dispatch
//! loop and the observable output contract: one line per message, in
//! arrival order, with no memory of prior messages.

use gnss_gateway::dispatch::{DispatchAction, Dispatcher, InboundMessage};
use gnss_gateway::transport::mqtt::MessageForwarder;
use tokio::sync::mpsc;

/// Drive a sequence of raw deliveries through the forwarder and
/// collect the dispatch lines the loop would print.
async fn run_dispatch_sequence(deliveries: &[(&str, &[u8])]) -> Vec<String> {
    let mut forwarder = MessageForwarder::new();
    let (tx, mut rx) = mpsc::channel(64);
    forwarder.set_message_sender(tx);

    for (topic, payload) in deliveries {
        forwarder
            .forward(InboundMessage::from_raw(topic, payload))
            .await
            .expect("forward should succeed with a sender attached");
    }
    drop(forwarder);

    let mut lines = Vec::new();
    while let Some(message) = rx.recv().await {
        let (_, line) = Dispatcher::dispatch(&message);
        lines.push(line);
    }
    lines
}

#[tokio::test]
async fn test_action1_emits_action1_line_with_topic() {
    let lines = run_dispatch_sequence(&[("sensors/gnss", b"ACTION1")]).await;
    assert_eq!(lines, vec!["[sensors/gnss] Interrupt received: Do action 1"]);
}

#[tokio::test]
async fn test_action2_emits_action2_line_with_topic() {
    let lines = run_dispatch_sequence(&[("test/topic", b"ACTION2")]).await;
    assert_eq!(lines, vec!["[test/topic] Interrupt received: Do action 2"]);
}

#[tokio::test]
async fn test_unknown_payload_echoed_verbatim() {
    let lines = run_dispatch_sequence(&[("test/topic", b"hello")]).await;
    assert_eq!(lines, vec!["[test/topic] Received unknown message: hello"]);
}

#[tokio::test]
async fn test_one_line_per_message_in_arrival_order() {
    let lines = run_dispatch_sequence(&[
        ("sensors/gnss", b"ACTION1"),
        ("test/topic", b"hello"),
        ("sensors/gnss", b"ACTION2"),
        ("test/topic", b"ACTION1"),
    ])
    .await;

    assert_eq!(
        lines,
        vec![
            "[sensors/gnss] Interrupt received: Do action 1",
            "[test/topic] Received unknown message: hello",
            "[sensors/gnss] Interrupt received: Do action 2",
            "[test/topic] Interrupt received: Do action 1",
        ]
    );
}

#[tokio::test]
async fn test_dispatch_has_no_memory_of_prior_messages() {
    // The same delivery produces the same line regardless of what
    // preceded it
    let alone = run_dispatch_sequence(&[("test/topic", b"hello")]).await;
    let after_actions = run_dispatch_sequence(&[
        ("sensors/gnss", b"ACTION1"),
        ("sensors/gnss", b"ACTION2"),
        ("test/topic", b"hello"),
    ])
    .await;

    assert_eq!(alone[0], after_actions[2]);
}

#[tokio::test]
async fn test_non_utf8_payload_falls_to_default_branch() {
    let lines = run_dispatch_sequence(&[("sensors/gnss", &[0xff, 0xfe])]).await;
    assert_eq!(lines.len(), 1);
    assert!(lines[0].starts_with("[sensors/gnss] Received unknown message: "));
}

#[tokio::test]
async fn test_forward_fails_once_receiver_dropped() {
    let mut forwarder = MessageForwarder::new();
    let (tx, rx) = mpsc::channel(1);
    forwarder.set_message_sender(tx);
    drop(rx);

    let result = forwarder
        .forward(InboundMessage::from_raw("test/topic", b"hello"))
        .await;
    assert!(result.is_err());
}

#[test]
fn test_classification_matches_rendered_line() {
    let cases: Vec<(&[u8], DispatchAction)> = vec![
        (b"ACTION1", DispatchAction::Action1),
        (b"ACTION2", DispatchAction::Action2),
        (b"ACTION3", DispatchAction::Unknown),
        (b"", DispatchAction::Unknown),
    ];

    for (payload, expected) in cases {
        let msg = InboundMessage::from_raw("test/topic", payload);
        let (action, line) = Dispatcher::dispatch(&msg);
        assert_eq!(action, expected);
        match action {
            DispatchAction::Action1 => assert!(line.ends_with("Do action 1")),
            DispatchAction::Action2 => assert!(line.ends_with("Do action 2")),
            DispatchAction::Unknown => assert!(line.contains("unknown message")),
        }
    }
}
