//! # Timeouts
//!
//! Runs on paused time: the dispatcher's sweep ticks advance the clock
//! whenever the runtime is idle.

use super::harness::{outcome, Harness};
use radio_gateway::{
    AckFrame, CommandKind, CommandOutcome, GatewayConfig, InboundFrame, ServiceDomain,
};
use std::sync::atomic::Ordering;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn test_activity_info_times_out_with_zeroed_report() {
    let mut h = Harness::new(GatewayConfig::default());

    let ticket = h.submit(ServiceDomain::Modem, CommandKind::GET_ACTIVITY_INFO).await;
    let sent = h.next_command().await;

    let done = super::harness::completion(ticket).await;
    match done.outcome {
        CommandOutcome::TimedOut(payload) => {
            assert_eq!(payload["sleep_mode_time_ms"], 0);
            assert_eq!(payload["tx_mode_time_ms"], serde_json::json!([0, 0, 0, 0, 0]));
        }
        other => panic!("expected synthetic timeout, got {:?}", other),
    }
    assert!(done.latency >= Duration::from_secs(2));
    assert!(!h.gateway.primary_guard().held);

    // The genuine reply loses
    h.respond(ServiceDomain::Modem, sent.serial, Some(serde_json::json!({ "late": true })));
    h.settle().await;
    let stats = h.gateway.pending_stats();
    assert_eq!(stats.total_synthetic.load(Ordering::Relaxed), 1);
    assert_eq!(stats.total_completed.load(Ordering::Relaxed), 1);
    assert_eq!(stats.total_anomalies.load(Ordering::Relaxed), 1);
}

#[tokio::test(start_paused = true)]
async fn test_reply_before_synthetic_deadline_wins() {
    let mut h = Harness::new(GatewayConfig::default());

    let ticket = h.submit(ServiceDomain::Modem, CommandKind::GET_ACTIVITY_INFO).await;
    let sent = h.next_command().await;
    h.respond(
        ServiceDomain::Modem,
        sent.serial,
        Some(serde_json::json!({ "sleep_mode_time_ms": 812 })),
    );

    assert_eq!(
        outcome(ticket).await,
        CommandOutcome::Success(Some(serde_json::json!({ "sleep_mode_time_ms": 812 })))
    );

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(
        h.gateway.pending_stats().total_synthetic.load(Ordering::Relaxed),
        0
    );
}

#[tokio::test(start_paused = true)]
async fn test_hold_timeout_releases_guard_and_keeps_waiting() {
    let mut h = Harness::new(GatewayConfig::default());

    let ticket = h.submit(ServiceDomain::Network, CommandKind::SIGNAL_STRENGTH).await;
    let sent = h.next_command().await;
    assert!(h.gateway.primary_guard().held);

    tokio::time::sleep(Duration::from_secs(62)).await;

    assert!(!h.gateway.primary_guard().held);
    assert!(h.gateway.is_pending(ticket.serial));
    assert_eq!(
        h.gateway.pending_stats().total_hold_expired.load(Ordering::Relaxed),
        1
    );

    // A late genuine reply still completes the command
    h.respond(ServiceDomain::Network, sent.serial, Some(serde_json::json!({ "rssi": -90 })));
    assert_eq!(
        outcome(ticket).await,
        CommandOutcome::Success(Some(serde_json::json!({ "rssi": -90 })))
    );
    assert_eq!(h.gateway.primary_guard().count, 0);
}

#[tokio::test(start_paused = true)]
async fn test_missing_ack_releases_handshake_only() {
    let config = GatewayConfig {
        acknowledged_kinds: vec![CommandKind::SEND_SMS],
        ..GatewayConfig::default()
    };
    let mut h = Harness::new(config);
    let domain = ServiceDomain::Messaging;

    let ticket = h.submit(domain, CommandKind::SEND_SMS).await;
    let sent = h.next_command().await;
    assert!(h.gateway.handshake_guard().held);

    tokio::time::sleep(Duration::from_secs(2)).await;

    assert!(!h.gateway.handshake_guard().held);
    assert!(h.gateway.primary_guard().held);
    assert!(h.gateway.is_pending(ticket.serial));

    // A late ack and the response still close the command cleanly
    h.deliver(domain, InboundFrame::Ack(AckFrame {}));
    h.respond(domain, sent.serial, None);
    assert_eq!(outcome(ticket).await, CommandOutcome::Success(None));
    assert_eq!(h.gateway.handshake_guard().count, 0);
    assert!(!h.gateway.primary_guard().held);
}
