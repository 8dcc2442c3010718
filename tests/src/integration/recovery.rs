//! # Backend Death and Recovery
//!
//! A death signal for the current generation fails every pending command of
//! the domain with `DomainReset`, then the domain is reprobed under a new
//! generation. Replies and signals from older generations are dropped.

use super::harness::{outcome, Harness};
use radio_gateway::{
    CommandKind, CommandOutcome, DeathSignal, GatewayConfig, GatewayError, Liveness, ResetScope,
    Serial, ServiceDomain,
};
use std::sync::atomic::Ordering;

fn reset(domain: ServiceDomain) -> CommandOutcome {
    CommandOutcome::Aborted(GatewayError::DomainReset { domain })
}

#[tokio::test]
async fn test_death_before_reply_then_late_reply_for_serial_seven() {
    let mut h = Harness::new(GatewayConfig::default());
    let domain = ServiceDomain::Voice;

    // Serials 0..=6 complete normally
    for _ in 0..7 {
        let ticket = h.submit(domain, CommandKind::GET_CURRENT_CALLS).await;
        let sent = h.next_command().await;
        h.respond(domain, sent.serial, None);
        outcome(ticket).await;
    }

    let ticket = h.submit(domain, CommandKind::DIAL).await;
    assert_eq!(ticket.serial, Serial(7));
    let old_generation = h.generation(domain);

    assert!(h.probe.kill(domain));
    assert_eq!(outcome(ticket).await, reset(domain));

    h.settle().await;
    assert_eq!(h.generation(domain), old_generation + 1);
    assert_eq!(h.gateway.liveness(domain), Liveness::Live(old_generation + 1));

    // Late reply from the dead connection
    let anomalies = h.gateway.pending_stats().total_anomalies.load(Ordering::Relaxed);
    h.deliver_at(
        domain,
        old_generation,
        radio_gateway::InboundFrame::Response(radio_gateway::ResponseFrame::ok(Serial(7), None)),
    );
    // Same serial on the new connection matches nothing either
    h.respond(domain, Serial(7), None);
    h.settle().await;

    assert_eq!(h.gateway.pending_count(), 0);
    assert_eq!(
        h.gateway.pending_stats().total_anomalies.load(Ordering::Relaxed),
        anomalies + 1
    );
    assert!(!h.gateway.primary_guard().held);

    // New work uses the new generation
    let ticket = h.submit(domain, CommandKind::HANGUP).await;
    let sent = h.next_command().await;
    h.respond(domain, sent.serial, None);
    assert_eq!(outcome(ticket).await, CommandOutcome::Success(None));
}

#[tokio::test]
async fn test_stale_death_cookie_is_ignored() {
    let mut h = Harness::new(GatewayConfig::default());
    let domain = ServiceDomain::Data;

    let ticket = h.submit(domain, CommandKind::SETUP_DATA_CALL).await;
    let sent = h.next_command().await;
    let generation = h.generation(domain);

    h.gateway
        .inbound_sender()
        .death(DeathSignal {
            domain,
            generation_cookie: generation - 1,
        })
        .unwrap();
    h.settle().await;

    assert!(h.gateway.is_pending(ticket.serial));
    assert_eq!(h.generation(domain), generation);
    assert_eq!(h.gateway.death_stats().total_stale.load(Ordering::Relaxed), 1);

    h.respond(domain, sent.serial, None);
    assert_eq!(outcome(ticket).await, CommandOutcome::Success(None));
}

#[tokio::test]
async fn test_death_only_affects_its_domain() {
    let mut h = Harness::new(GatewayConfig::default());

    let voice = h.submit(ServiceDomain::Voice, CommandKind::DIAL).await;
    h.next_command().await;
    let data = h.submit(ServiceDomain::Data, CommandKind::SETUP_DATA_CALL).await;
    let data_sent = h.next_command().await;
    let data_generation = h.generation(ServiceDomain::Data);

    h.probe.kill(ServiceDomain::Voice);
    assert_eq!(outcome(voice).await, reset(ServiceDomain::Voice));

    h.settle().await;
    assert_eq!(h.generation(ServiceDomain::Data), data_generation);
    assert!(h.gateway.is_pending(data.serial));

    h.respond(ServiceDomain::Data, data_sent.serial, None);
    assert_eq!(outcome(data).await, CommandOutcome::Success(None));
}

#[tokio::test]
async fn test_all_domains_scope() {
    let mut config = GatewayConfig::default();
    config.recovery.scope = ResetScope::AllDomains;
    let mut h = Harness::new(config);

    let voice = h.submit(ServiceDomain::Voice, CommandKind::DIAL).await;
    h.next_command().await;
    let data = h.submit(ServiceDomain::Data, CommandKind::SETUP_DATA_CALL).await;
    h.next_command().await;
    let data_generation = h.generation(ServiceDomain::Data);

    h.probe.kill(ServiceDomain::Voice);

    assert_eq!(outcome(voice).await, reset(ServiceDomain::Voice));
    assert_eq!(outcome(data).await, reset(ServiceDomain::Data));

    h.settle().await;
    assert_eq!(h.generation(ServiceDomain::Data), data_generation + 1);
    assert_eq!(h.gateway.death_stats().total_resets.load(Ordering::Relaxed), 2);
    assert_eq!(h.gateway.death_stats().total_deaths.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn test_backend_gone_for_good_disables_domain() {
    let mut h = Harness::new(GatewayConfig::default());
    let domain = ServiceDomain::Network;

    let ticket = h.submit(domain, CommandKind::SIGNAL_STRENGTH).await;
    h.next_command().await;

    h.probe.withdraw(domain);
    h.probe.kill(domain);
    assert_eq!(outcome(ticket).await, reset(domain));
    h.settle().await;

    assert!(matches!(h.gateway.liveness(domain), Liveness::Disabled(_)));
    let err = h
        .gateway
        .submit(radio_gateway::CommandRequest::new(domain, CommandKind::SIGNAL_STRENGTH))
        .await
        .unwrap_err();
    assert_eq!(err, GatewayError::DomainUnavailable { domain });
}

#[tokio::test]
async fn test_repeated_garbage_resets_connection() {
    let mut h = Harness::new(GatewayConfig::default());
    let domain = ServiceDomain::Sim;

    let ticket = h.submit(domain, CommandKind::GET_SIM_STATUS).await;
    h.next_command().await;
    let generation = h.generation(domain);

    let inbound = h.gateway.inbound_sender();
    for _ in 0..h.gateway.config().limits.max_consecutive_decode_errors {
        inbound.raw(domain, generation, b"\x00\x01not json".to_vec()).unwrap();
    }

    assert_eq!(outcome(ticket).await, reset(domain));
    h.settle().await;
    assert_eq!(h.generation(domain), generation + 1);
}
