//! # Transport Failure and Shutdown

use super::harness::{outcome, Harness};
use radio_gateway::{
    CommandKind, CommandOutcome, CommandRequest, GatewayConfig, GatewayError, ServiceDomain,
};
use std::sync::atomic::Ordering;

#[tokio::test]
async fn test_failed_send_resets_domain() {
    let mut h = Harness::new(GatewayConfig::default());
    let domain = ServiceDomain::Voice;

    let pending = h.submit(domain, CommandKind::GET_CURRENT_CALLS).await;
    h.next_command().await;
    let generation = h.generation(domain);

    h.probe.fail_sends(domain, true);
    let err = h
        .gateway
        .submit(CommandRequest::new(domain, CommandKind::DIAL))
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Transport { domain: d, .. } if d == domain));

    // The earlier command is failed by the reset the send failure raised
    assert_eq!(
        outcome(pending).await,
        CommandOutcome::Aborted(GatewayError::DomainReset { domain })
    );
    h.settle().await;
    assert_eq!(h.generation(domain), generation + 1);
    assert_eq!(h.gateway.pending_count(), 0);
    assert!(!h.gateway.primary_guard().held);
    assert_eq!(
        h.gateway.pending_stats().total_withdrawn.load(Ordering::Relaxed),
        1
    );

    h.probe.fail_sends(domain, false);
    let ticket = h.submit(domain, CommandKind::DIAL).await;
    let sent = h.next_command().await;
    h.respond(domain, sent.serial, None);
    assert_eq!(outcome(ticket).await, CommandOutcome::Success(None));
}

#[tokio::test]
async fn test_shutdown_fails_pending_commands() {
    let mut h = Harness::new(GatewayConfig::default());

    let mut tickets = Vec::new();
    for domain in [ServiceDomain::Voice, ServiceDomain::Data, ServiceDomain::Sim] {
        let kind = match domain {
            ServiceDomain::Voice => CommandKind::DIAL,
            ServiceDomain::Data => CommandKind::SETUP_DATA_CALL,
            _ => CommandKind::GET_SIM_STATUS,
        };
        tickets.push(h.submit(domain, kind).await);
        h.next_command().await;
    }

    assert_eq!(h.gateway.shutdown().await, 3);
    for ticket in tickets {
        assert_eq!(
            outcome(ticket).await,
            CommandOutcome::Aborted(GatewayError::ShuttingDown)
        );
    }
    assert!(!h.gateway.primary_guard().held);

    let err = h
        .gateway
        .submit(CommandRequest::new(ServiceDomain::Voice, CommandKind::HANGUP))
        .await
        .unwrap_err();
    assert_eq!(err, GatewayError::ShuttingDown);
    assert!(h.gateway.inbound_sender().is_closed());
}
