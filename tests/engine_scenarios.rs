//! End-to-end intent scenarios against a scripted device.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{test_device, DeviceScript, ScriptedTransport};
use pretty_assertions::assert_eq;

use fleetconf::config::EngineConfig;
use fleetconf::dialect::{
    AclAction, AclRuleParams, DhcpPoolParams, Intent, NatOutboundParams, StpMode, StpParams,
    VrpDialect,
};
use fleetconf::engine::ConfigEngine;
use fleetconf::events::{Event, EventKind};
use fleetconf::inventory::MemoryRepository;
use fleetconf::probe::Pinger;
use fleetconf::topology::Topology;

struct NeverPinger;

#[async_trait::async_trait]
impl Pinger for NeverPinger {
    async fn ping(&self, _addr: std::net::IpAddr, _timeout: Duration) -> bool {
        false
    }
}

fn engine_with(transport: Arc<ScriptedTransport>) -> Arc<ConfigEngine> {
    ConfigEngine::with_parts(
        Arc::new(MemoryRepository::new([test_device("SW1")])),
        transport,
        Arc::new(VrpDialect::new()),
        Topology::dual_region(),
        Arc::new(NeverPinger),
        EngineConfig::default(),
    )
}

fn issued_commands(events: &[Event]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match &e.kind {
            EventKind::CommandIssued { command } => Some(command.clone()),
            _ => None,
        })
        .collect()
}

fn terminal_reason(events: &[Event]) -> Option<String> {
    events.iter().find_map(|e| match &e.kind {
        EventKind::TerminalFailure { reason, .. } => Some(reason.clone()),
        _ => None,
    })
}

fn succeeded(events: &[Event]) -> bool {
    events
        .iter()
        .any(|e| matches!(e.kind, EventKind::TerminalSuccess { .. }))
}

fn dhcp_pool_intent() -> Intent {
    Intent::DhcpPool(DhcpPoolParams {
        pool_name: "P1".into(),
        network: "192.168.10.0/24".into(),
        gateway: Some("192.168.10.1".parse().unwrap()),
        dns: vec!["8.8.8.8".parse().unwrap()],
        excluded: None,
        domain: None,
        lease_days: Some(3),
    })
}

#[tokio::test]
async fn dhcp_pool_happy_path_issues_the_exact_sequence() {
    let transport = Arc::new(ScriptedTransport::new("SW1", DeviceScript::default()));
    let engine = engine_with(Arc::clone(&transport));

    let stream = engine.submit_intent("SW1", dhcp_pool_intent());
    let events = engine.events(stream).collect().await;

    assert!(succeeded(&events), "events: {:?}", events);
    assert_eq!(
        issued_commands(&events),
        vec![
            "system-view",
            "ip pool P1",
            "gateway-list 192.168.10.1",
            "network 192.168.10.0 mask 255.255.255.0",
            "dns-list 8.8.8.8",
            "lease day 3",
            "quit",
            "quit",
            "save",
            "Y",
        ]
    );
}

#[tokio::test]
async fn invalid_acl_number_fails_before_any_io() {
    let transport = Arc::new(ScriptedTransport::new("SW1", DeviceScript::default()));
    let engine = engine_with(Arc::clone(&transport));

    let stream = engine.submit_intent(
        "SW1",
        Intent::AclRule(AclRuleParams {
            acl_number: 1999,
            rule_number: 5,
            action: AclAction::Permit,
            source: "10.0.0.0 0.255.255.255".into(),
            destination: None,
            protocol: None,
            port_expression: None,
        }),
    );
    let events = engine.events(stream).collect().await;

    assert_eq!(terminal_reason(&events).as_deref(), Some("parameter"));
    assert_eq!(transport.open_count(), 0);
    assert!(issued_commands(&events).is_empty());
}

#[tokio::test]
async fn easy_ip_conflict_triggers_one_spare_acl_retry() {
    let script = DeviceScript {
        easy_ip_conflict: true,
        ..Default::default()
    };
    let transport = Arc::new(ScriptedTransport::new("SW1", script));
    let engine = engine_with(Arc::clone(&transport));

    let stream = engine.submit_intent(
        "SW1",
        Intent::NatOutbound(NatOutboundParams {
            acl_number: 2000,
            inside_network: Some("192.168.1.0 0.0.0.255".into()),
            outside_interface: "GigabitEthernet0/0/1".into(),
        }),
    );
    let events = engine.events(stream).collect().await;

    assert!(succeeded(&events), "events: {:?}", events);
    assert!(events.iter().any(|e| matches!(
        &e.kind,
        EventKind::Warning { message } if message.contains("spare ACL")
    )));

    let issued = issued_commands(&events);
    assert!(issued.contains(&"nat outbound 2000".to_string()));
    assert!(issued.contains(&"nat outbound 3000".to_string()));
    let state = transport.state();
    assert!(state
        .lock()
        .issued
        .iter()
        .any(|line| line == "rule 5 permit ip source 192.168.1.0 0.0.0.255"));
}

#[tokio::test]
async fn rejected_critical_command_is_terminal() {
    let script = DeviceScript {
        fail_substring: Some("ip pool".into()),
        ..Default::default()
    };
    let transport = Arc::new(ScriptedTransport::new("SW1", script));
    let engine = engine_with(transport);

    let stream = engine.submit_intent("SW1", dhcp_pool_intent());
    let events = engine.events(stream).collect().await;
    assert_eq!(terminal_reason(&events).as_deref(), Some("device_rejected"));
}

#[tokio::test]
async fn rejected_tolerated_command_warns_and_continues() {
    let script = DeviceScript {
        fail_substring: Some("dns-list".into()),
        ..Default::default()
    };
    let transport = Arc::new(ScriptedTransport::new("SW1", script));
    let engine = engine_with(transport);

    let stream = engine.submit_intent("SW1", dhcp_pool_intent());
    let events = engine.events(stream).collect().await;

    assert!(succeeded(&events), "events: {:?}", events);
    assert!(events.iter().any(|e| matches!(
        &e.kind,
        EventKind::Warning { message } if message.contains("dns-list")
    )));
}

#[tokio::test]
async fn verification_failure_is_terminal() {
    let script = DeviceScript {
        verify_blind: true,
        ..Default::default()
    };
    let transport = Arc::new(ScriptedTransport::new("SW1", script));
    let engine = engine_with(transport);

    let stream = engine.submit_intent("SW1", dhcp_pool_intent());
    let events = engine.events(stream).collect().await;
    assert_eq!(
        terminal_reason(&events).as_deref(),
        Some("verification_failed")
    );
}

#[tokio::test]
async fn stp_intent_applies_and_verifies() {
    let transport = Arc::new(ScriptedTransport::new("SW1", DeviceScript::default()));
    let engine = engine_with(transport);

    let stream = engine.submit_intent(
        "SW1",
        Intent::Stp(StpParams {
            mode: StpMode::Rstp,
            priority: 4096,
            forward_delay: 15,
            hello: 2,
            max_age: 20,
            region_name: None,
            revision: None,
            instances: vec![],
        }),
    );
    let events = engine.events(stream).collect().await;
    assert!(succeeded(&events), "events: {:?}", events);
    assert!(issued_commands(&events).contains(&"stp timer root-hello 2".to_string()));
}

#[tokio::test]
async fn cancellation_mid_dialogue_then_follow_up_succeeds() {
    let script = DeviceScript {
        response_delay: Some(Duration::from_millis(300)),
        ..Default::default()
    };
    let transport = Arc::new(ScriptedTransport::new("SW1", script));
    let engine = engine_with(Arc::clone(&transport));

    let stream = engine.submit_intent("SW1", dhcp_pool_intent());
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(engine.cancel(stream));

    let events = engine.events(stream).collect().await;
    assert_eq!(terminal_reason(&events).as_deref(), Some("cancelled"));

    // The lease and session were released; a fresh intent completes.
    let retry = engine.submit_intent("SW1", dhcp_pool_intent());
    let events = engine.events(retry).collect().await;
    assert!(succeeded(&events), "events: {:?}", events);
}

#[tokio::test]
async fn cancelled_intent_still_closes_the_session() {
    let script = DeviceScript {
        response_delay: Some(Duration::from_millis(300)),
        ..Default::default()
    };
    let transport = Arc::new(ScriptedTransport::new("SW1", script));
    let engine = engine_with(Arc::clone(&transport));

    let stream = engine.submit_intent("SW1", dhcp_pool_intent());
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(engine.cancel(stream));

    let events = engine.events(stream).collect().await;
    assert_eq!(terminal_reason(&events).as_deref(), Some("cancelled"));

    // The dialogue was abandoned mid-command, yet the session's own close
    // ran rather than relying on the socket's drop.
    assert_eq!(transport.open_count(), 1);
    assert_eq!(transport.close_count(), 1);
}

#[tokio::test]
async fn one_device_never_carries_two_sessions() {
    let script = DeviceScript {
        response_delay: Some(Duration::from_millis(20)),
        ..Default::default()
    };
    let transport = Arc::new(ScriptedTransport::new("SW1", script));
    let engine = engine_with(Arc::clone(&transport));

    let first = engine.submit_intent("SW1", dhcp_pool_intent());
    let second = engine.submit_intent("SW1", dhcp_pool_intent());

    let first_events = engine.events(first).collect().await;
    let second_events = engine.events(second).collect().await;

    assert!(succeeded(&first_events));
    assert!(succeeded(&second_events));
    assert_eq!(transport.open_count(), 2);
    assert_eq!(transport.max_concurrent_sessions(), 1);
}
