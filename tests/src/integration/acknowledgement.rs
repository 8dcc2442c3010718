//! # Acknowledgement Flows
//!
//! Commands of an acknowledged kind hold the handshake guard until the
//! backend's acknowledgement arrives; the primary guard stays held until the
//! full response.

use super::harness::{outcome, Harness};
use radio_gateway::{
    AckFrame, CommandKind, CommandOutcome, GatewayConfig, GuardKind, HolderId, InboundFrame,
    ResponseFrame, ServiceDomain,
};
use std::sync::atomic::Ordering;
use std::time::Duration;

fn acked_config() -> GatewayConfig {
    let mut config = GatewayConfig {
        acknowledged_kinds: vec![CommandKind::SEND_SMS],
        ..GatewayConfig::default()
    };
    // Keep the handshake timeout out of the way of these flows
    config.timeouts.handshake_hold = Duration::from_secs(30);
    config
}

#[tokio::test]
async fn test_ack_before_response_releases_handshake_only() {
    let mut h = Harness::new(acked_config());
    let domain = ServiceDomain::Messaging;

    let ticket = h.submit(domain, CommandKind::SEND_SMS).await;
    let sent = h.next_command().await;

    let handshake = h.gateway.handshake_guard();
    assert_eq!(handshake.kind, GuardKind::Handshake);
    assert!(handshake.held);
    assert_eq!(handshake.count, 1);
    assert!(h.gateway.primary_guard().held);

    h.deliver(domain, InboundFrame::Ack(AckFrame {}));
    h.settle().await;

    assert!(!h.gateway.handshake_guard().held);
    assert_eq!(h.gateway.handshake_guard().count, 0);
    assert!(h.gateway.primary_guard().held);
    assert!(h.gateway.is_pending(ticket.serial));

    h.respond(domain, sent.serial, Some(serde_json::json!({ "message_ref": 12 })));
    assert_eq!(
        outcome(ticket).await,
        CommandOutcome::Success(Some(serde_json::json!({ "message_ref": 12 })))
    );
    assert!(!h.gateway.primary_guard().held);
    assert_eq!(
        h.gateway.pending_stats().total_completed.load(Ordering::Relaxed),
        1
    );
}

#[tokio::test]
async fn test_acks_match_oldest_waiting_command() {
    let mut h = Harness::new(acked_config());
    let domain = ServiceDomain::Messaging;

    let first = h.submit(domain, CommandKind::SEND_SMS).await;
    h.next_command().await;
    let second = h.submit(domain, CommandKind::SEND_SMS).await;
    h.next_command().await;
    assert_eq!(h.gateway.handshake_guard().count, 2);

    h.deliver(domain, InboundFrame::Ack(AckFrame {}));
    h.settle().await;

    let holders: Vec<HolderId> = h
        .gateway
        .handshake_guard()
        .holders
        .into_iter()
        .map(|(_, holder)| holder)
        .collect();
    assert_eq!(holders, vec![HolderId::Command(second.serial)]);
    assert!(h.gateway.is_pending(first.serial));
}

#[tokio::test]
async fn test_unacknowledged_kinds_skip_handshake() {
    let mut h = Harness::new(acked_config());

    h.submit(ServiceDomain::Voice, CommandKind::DIAL).await;
    h.next_command().await;

    assert!(!h.gateway.handshake_guard().held);

    // An ack nobody waits for is logged and dropped
    h.deliver(ServiceDomain::Voice, InboundFrame::Ack(AckFrame {}));
    h.settle().await;
    assert_eq!(
        h.gateway.pending_stats().total_anomalies.load(Ordering::Relaxed),
        1
    );
    assert!(h.gateway.primary_guard().held);
}

#[tokio::test]
async fn test_response_requiring_ack_is_acked_then_delivered() {
    let mut h = Harness::new(GatewayConfig::default());
    let domain = ServiceDomain::Data;

    let ticket = h.submit(domain, CommandKind::SETUP_DATA_CALL).await;
    let sent = h.next_command().await;

    h.deliver(
        domain,
        InboundFrame::Response(ResponseFrame::ok(sent.serial, None).requiring_ack()),
    );

    assert_eq!(outcome(ticket).await, CommandOutcome::Success(None));
    assert_eq!(h.probe.acks_sent(domain), 1);
    assert!(!h.gateway.handshake_guard().held);
}

#[tokio::test]
async fn test_reset_releases_outstanding_handshake() {
    let mut h = Harness::new(acked_config());
    let domain = ServiceDomain::Messaging;

    let ticket = h.submit(domain, CommandKind::SEND_SMS).await;
    h.next_command().await;
    assert!(h.gateway.handshake_guard().held);

    h.probe.kill(domain);
    assert!(matches!(outcome(ticket).await, CommandOutcome::Aborted(_)));
    assert!(!h.gateway.handshake_guard().held);
    assert!(!h.gateway.primary_guard().held);
}
