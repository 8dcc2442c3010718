//! # Request Lifecycle
//!
//! Submit → send → response → exactly one outcome, across domains and with
//! responses arriving out of order.

use super::harness::{completion, outcome, Harness};
use proptest::prelude::*;
use radio_gateway::{
    codes, CommandKind, CommandOutcome, GatewayConfig, InboundFrame, ResponseFrame, Serial,
    ServiceDomain,
};
use std::collections::HashSet;
use std::sync::atomic::Ordering;

// =============================================================================
// Basic flow
// =============================================================================

#[tokio::test]
async fn test_response_payload_reaches_caller() {
    let mut h = Harness::new(GatewayConfig::default());

    let ticket = h.submit(ServiceDomain::Modem, CommandKind::BASEBAND_VERSION).await;
    let sent = h.next_command().await;
    assert_eq!(sent.serial, ticket.serial);
    assert_eq!(sent.kind, CommandKind::BASEBAND_VERSION);

    h.respond(ServiceDomain::Modem, sent.serial, Some(serde_json::json!("M2.1")));

    let done = completion(ticket).await;
    assert_eq!(done.outcome, CommandOutcome::Success(Some(serde_json::json!("M2.1"))));
    assert_eq!(done.domain, ServiceDomain::Modem);
    assert_eq!(h.gateway.pending_count(), 0);
}

#[tokio::test]
async fn test_backend_error_code_is_delivered() {
    let mut h = Harness::new(GatewayConfig::default());

    let ticket = h.submit(ServiceDomain::Data, CommandKind::SETUP_DATA_CALL).await;
    let sent = h.next_command().await;
    h.deliver(
        ServiceDomain::Data,
        InboundFrame::Response(ResponseFrame::error(sent.serial, codes::NO_RESOURCES)),
    );

    assert_eq!(
        outcome(ticket).await,
        CommandOutcome::Rejected {
            code: codes::NO_RESOURCES,
            payload: None
        }
    );
}

#[tokio::test]
async fn test_out_of_order_responses_across_domains() {
    let mut h = Harness::new(GatewayConfig::default());

    let plan = [
        (ServiceDomain::Voice, CommandKind::GET_CURRENT_CALLS),
        (ServiceDomain::Data, CommandKind::SETUP_DATA_CALL),
        (ServiceDomain::Network, CommandKind::SIGNAL_STRENGTH),
        (ServiceDomain::Voice, CommandKind::HANGUP),
        (ServiceDomain::Sim, CommandKind::GET_SIM_STATUS),
    ];

    let mut tickets = Vec::new();
    let mut sent = Vec::new();
    for (domain, kind) in plan {
        tickets.push(h.submit(domain, kind).await);
        sent.push(h.next_command().await);
    }

    let serials: HashSet<Serial> = tickets.iter().map(|t| t.serial).collect();
    assert_eq!(serials.len(), plan.len());
    assert_eq!(h.gateway.primary_guard().count, plan.len());

    for frame in sent.iter().rev() {
        h.respond(
            frame.domain,
            frame.serial,
            Some(serde_json::json!({ "serial": frame.serial.0 })),
        );
    }

    for ticket in tickets {
        let serial = ticket.serial;
        assert_eq!(
            outcome(ticket).await,
            CommandOutcome::Success(Some(serde_json::json!({ "serial": serial.0 })))
        );
    }
    assert_eq!(h.gateway.pending_count(), 0);
    assert!(!h.gateway.primary_guard().held);
}

#[tokio::test]
async fn test_duplicate_response_is_dropped() {
    let mut h = Harness::new(GatewayConfig::default());

    let ticket = h.submit(ServiceDomain::Voice, CommandKind::DIAL).await;
    let sent = h.next_command().await;

    h.respond(ServiceDomain::Voice, sent.serial, None);
    h.respond(ServiceDomain::Voice, sent.serial, None);
    h.settle().await;

    assert_eq!(outcome(ticket).await, CommandOutcome::Success(None));
    let stats = h.gateway.pending_stats();
    assert_eq!(stats.total_completed.load(Ordering::Relaxed), 1);
    assert_eq!(stats.total_anomalies.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn test_response_on_wrong_domain_is_dropped() {
    let mut h = Harness::new(GatewayConfig::default());

    let ticket = h.submit(ServiceDomain::Voice, CommandKind::DIAL).await;
    let sent = h.next_command().await;

    // Same serial, but delivered on the data connection
    h.gateway.connect(ServiceDomain::Data).await.unwrap();
    h.respond(ServiceDomain::Data, sent.serial, None);
    h.settle().await;
    assert!(h.gateway.is_pending(ticket.serial));

    h.respond(ServiceDomain::Voice, sent.serial, None);
    assert_eq!(outcome(ticket).await, CommandOutcome::Success(None));
}

#[tokio::test]
async fn test_indications_reach_domain_subscribers() {
    let h = Harness::new(GatewayConfig::default());
    h.gateway.connect(ServiceDomain::Network).await.unwrap();
    let mut network = h.gateway.subscribe_indications(ServiceDomain::Network);

    let indication = radio_gateway::IndicationFrame {
        domain: ServiceDomain::Network,
        kind: radio_gateway::IndicationKind(1037),
        ack_required: false,
        payload: serde_json::json!({ "rat": "lte" }),
    };
    h.deliver(ServiceDomain::Network, InboundFrame::Indication(indication.clone()));

    let received = tokio::time::timeout(std::time::Duration::from_secs(5), network.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received, indication);
}

#[tokio::test]
async fn test_metrics_render() {
    let _ = radio_telemetry::register_metrics();
    let mut h = Harness::new(GatewayConfig::default());

    let ticket = h.submit(ServiceDomain::Voice, CommandKind::DIAL).await;
    let sent = h.next_command().await;
    h.respond(ServiceDomain::Voice, sent.serial, None);
    outcome(ticket).await;

    let text = h.gateway.render_metrics().unwrap();
    assert!(text.contains("rg_commands_submitted_total"));
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Whatever order responses arrive in, each command gets its own payload once.
    #[test]
    fn prop_each_command_gets_its_own_response(
        order in Just((0..8usize).collect::<Vec<_>>()).prop_shuffle()
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let mut h = Harness::new(GatewayConfig::default());
            let mut tickets = Vec::new();
            let mut sent = Vec::new();
            for i in 0..order.len() {
                let domain = radio_gateway::ServiceDomain::ALL[i % 6];
                tickets.push(h.submit(domain, CommandKind::GET_CURRENT_CALLS).await);
                sent.push(h.next_command().await);
            }

            for &i in &order {
                h.respond(sent[i].domain, sent[i].serial, Some(serde_json::json!(i)));
            }

            for (i, ticket) in tickets.into_iter().enumerate() {
                assert_eq!(
                    outcome(ticket).await,
                    CommandOutcome::Success(Some(serde_json::json!(i)))
                );
            }
            assert_eq!(h.gateway.pending_count(), 0);
            assert_eq!(h.gateway.primary_guard().count, 0);
        });
    }
}
