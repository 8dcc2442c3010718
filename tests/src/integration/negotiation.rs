//! # Version Negotiation
//!
//! Descending probe order, negative caching, per-version command support and
//! downgrade-only compatibility overrides.

use super::harness::{outcome, Harness, VERSIONS};
use radio_gateway::{
    CommandKind, CommandOutcome, CommandRequest, ConnectionState, GatewayConfig, GatewayError,
    KindSetStrategy, Liveness, LoopbackProbe, ServiceDomain, StrategyTable, VersionTag,
};

#[tokio::test]
async fn test_highest_successful_probe_wins() {
    let (probe, commands) = LoopbackProbe::new();
    probe.offer(ServiceDomain::Data, &[VersionTag::V1_0, VersionTag::V1_3]);
    let mut h = Harness::with_probe(
        GatewayConfig::default(),
        probe,
        commands,
        StrategyTable::uniform(&VERSIONS),
    );

    let ticket = h.submit(ServiceDomain::Data, CommandKind::SETUP_DATA_CALL).await;
    assert_eq!(ticket.version, VersionTag::V1_3);
    assert_eq!(h.next_command().await.version, VersionTag::V1_3);

    let probed: Vec<VersionTag> = h.probe.probe_log().into_iter().map(|(_, v)| v).collect();
    assert_eq!(probed, vec![VersionTag::V1_6, VersionTag::V1_5, VersionTag::V1_3]);
    assert_eq!(
        h.gateway.connection(ServiceDomain::Data).version(),
        Some(VersionTag::V1_3)
    );
}

#[tokio::test]
async fn test_unavailable_domain_is_not_reprobed() {
    let (probe, commands) = LoopbackProbe::new();
    let h = Harness::with_probe(
        GatewayConfig::default(),
        probe,
        commands,
        StrategyTable::uniform(&VERSIONS),
    );

    for _ in 0..3 {
        let err = h
            .gateway
            .submit(CommandRequest::new(ServiceDomain::Messaging, CommandKind::SEND_SMS))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            GatewayError::DomainUnavailable {
                domain: ServiceDomain::Messaging
            }
        );
    }

    assert_eq!(h.probe.probe_log().len(), VERSIONS.len());
    assert_eq!(
        h.gateway.connection(ServiceDomain::Messaging).state(),
        ConnectionState::Disabled
    );
    assert!(matches!(
        h.gateway.liveness(ServiceDomain::Messaging),
        Liveness::Disabled(_)
    ));
    assert!(!h.gateway.primary_guard().held);
}

#[tokio::test]
async fn test_rediscover_after_backend_appears() {
    let (probe, commands) = LoopbackProbe::new();
    let h = Harness::with_probe(
        GatewayConfig::default(),
        probe,
        commands,
        StrategyTable::uniform(&VERSIONS),
    );

    assert!(h.gateway.connect(ServiceDomain::Sim).await.is_err());

    h.probe.offer(ServiceDomain::Sim, &[VersionTag::V1_5]);
    let connection = h.gateway.rediscover_domain(ServiceDomain::Sim).await.unwrap();
    assert_eq!(connection.version(), Some(VersionTag::V1_5));

    let ticket = h.submit(ServiceDomain::Sim, CommandKind::GET_SIM_STATUS).await;
    assert_eq!(ticket.version, VersionTag::V1_5);
}

#[tokio::test]
async fn test_kind_missing_from_negotiated_version() {
    let (probe, commands) = LoopbackProbe::new();
    probe.offer(ServiceDomain::Modem, &[VersionTag::V1_3]);

    let mut strategies = StrategyTable::new();
    strategies
        .register(KindSetStrategy::all(ServiceDomain::Modem, VersionTag::V1_6))
        .register(KindSetStrategy::only(
            ServiceDomain::Modem,
            VersionTag::V1_3,
            [CommandKind::BASEBAND_VERSION, CommandKind::RADIO_POWER],
        ));
    let mut h = Harness::with_probe(GatewayConfig::default(), probe, commands, strategies);

    let err = h
        .gateway
        .submit(CommandRequest::new(ServiceDomain::Modem, CommandKind::GET_ACTIVITY_INFO))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        GatewayError::RequestNotSupported {
            domain: ServiceDomain::Modem,
            kind: CommandKind::GET_ACTIVITY_INFO,
            version: VersionTag::V1_3,
        }
    );
    assert_eq!(err.code(), radio_gateway::codes::REQUEST_NOT_SUPPORTED);
    assert_eq!(h.gateway.pending_count(), 0);

    // Supported kinds still flow
    let ticket = h.submit(ServiceDomain::Modem, CommandKind::RADIO_POWER).await;
    let sent = h.next_command().await;
    h.respond(ServiceDomain::Modem, sent.serial, None);
    assert_eq!(outcome(ticket).await, CommandOutcome::Success(None));
}

#[tokio::test]
async fn test_override_only_moves_down() {
    let mut h = Harness::new(GatewayConfig::default());
    let kind = CommandKind::SETUP_DATA_CALL;

    assert!(h.gateway.set_compat_override(kind, VersionTag::V1_5));
    assert!(!h.gateway.set_compat_override(kind, VersionTag::V1_6));
    assert!(!h.gateway.set_compat_override(kind, VersionTag::V1_5));
    assert!(h.gateway.set_compat_override(kind, VersionTag::V1_3));
    assert_eq!(h.gateway.compat_override(kind), Some(VersionTag::V1_3));

    h.submit(ServiceDomain::Data, kind).await;
    let sent = h.next_command().await;
    assert_eq!(sent.version, VersionTag::V1_3);

    // The override never raises a command above the negotiated version
    assert!(h.gateway.set_compat_override(CommandKind::DIAL, VersionTag::V1_3));
    h.probe.withdraw(ServiceDomain::Voice);
    h.probe.offer(ServiceDomain::Voice, &[VersionTag::V1_0]);
    h.submit(ServiceDomain::Voice, CommandKind::DIAL).await;
    assert_eq!(h.next_command().await.version, VersionTag::V1_0);
}
