//! NAT intents: static binding and dynamic outbound (PAT).
//!
//! The outbound variant carries a planned retry: when the device reports that
//! Easy IP is already configured on the outside interface, the engine replans
//! once with the spare ACL number before failing. That fallback is part of
//! the contract, not a generic retry.

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use crate::dialect::{Command, CommandPlan, Mode};
use crate::error::{EngineError, Result};

use super::acl::{BASIC_RANGE, EXTENDED_RANGE};

const STATIC_FAMILY: &str = "nat_static";
const OUTBOUND_FAMILY: &str = "nat_outbound";

/// Device output marker for the Easy-IP conflict.
pub const EASY_IP_MARKER: &str = "Easy IP already configured on this interface";

/// Spare ACL number used by the planned Easy-IP fallback.
pub const SPARE_ACL: u32 = 3000;

/// Parameters for a one-to-one static NAT binding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NatStaticParams {
    /// Inside (private) address.
    pub inside_ip: Ipv4Addr,
    /// Outside (global) address.
    pub outside_ip: Ipv4Addr,
}

/// Parameters for dynamic/PAT NAT on an outside interface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NatOutboundParams {
    /// ACL selecting the inside networks.
    pub acl_number: u32,
    /// Optional inside network (address + wildcard); when present the plan
    /// creates the ACL with a single permit rule first.
    pub inside_network: Option<String>,
    /// Outside interface name.
    pub outside_interface: String,
}

pub(super) fn validate_static(_params: &NatStaticParams) -> Result<()> {
    // Both fields are typed addresses; nothing further to constrain.
    Ok(())
}

pub(super) fn validate_outbound(params: &NatOutboundParams) -> Result<()> {
    if !BASIC_RANGE.contains(&params.acl_number) && !EXTENDED_RANGE.contains(&params.acl_number) {
        return Err(EngineError::parameter(
            OUTBOUND_FAMILY,
            format!("acl_number {} outside 2000..=3999", params.acl_number),
        ));
    }
    if params.outside_interface.trim().is_empty() {
        return Err(EngineError::parameter(
            OUTBOUND_FAMILY,
            "outside_interface must be non-empty",
        ));
    }
    if let Some(network) = &params.inside_network {
        if network.trim().is_empty() {
            return Err(EngineError::parameter(
                OUTBOUND_FAMILY,
                "inside_network must be non-empty when present",
            ));
        }
    }
    Ok(())
}

pub(super) fn plan_static(params: &NatStaticParams) -> CommandPlan {
    CommandPlan::new(vec![
        Command::new("system-view", Mode::System),
        // The device asks before overwriting an existing binding.
        Command::new(
            format!(
                "nat static global {} inside {}",
                params.outside_ip, params.inside_ip
            ),
            Mode::System,
        )
        .confirmable(),
        Command::new("quit", Mode::User),
    ])
}

pub(super) fn plan_outbound(params: &NatOutboundParams) -> CommandPlan {
    let mut commands = vec![Command::new("system-view", Mode::System)];

    if let Some(network) = &params.inside_network {
        let acl_ctx = Mode::sub(format!("acl-{}", params.acl_number));
        commands.push(Command::new(
            format!("acl number {}", params.acl_number),
            acl_ctx.clone(),
        ));
        // Extended numbers need the protocol selector in the rule.
        let rule = if EXTENDED_RANGE.contains(&params.acl_number) {
            format!("rule 5 permit ip source {}", network)
        } else {
            format!("rule 5 permit source {}", network)
        };
        commands.push(Command::new(rule, acl_ctx));
        commands.push(Command::new("quit", Mode::System));
    }

    let if_ctx = Mode::sub(params.outside_interface.clone());
    commands.push(Command::new(
        format!("interface {}", params.outside_interface),
        if_ctx.clone(),
    ));
    commands.push(
        Command::new(format!("nat outbound {}", params.acl_number), if_ctx).easy_ip_fallback(),
    );
    commands.push(Command::new("quit", Mode::System));
    commands.push(Command::new("quit", Mode::User));

    CommandPlan::new(commands)
}

/// The replanned intent parameters for the Easy-IP fallback, or `None` when
/// the spare number is already in play.
pub(super) fn outbound_fallback(params: &NatOutboundParams) -> Option<NatOutboundParams> {
    if params.acl_number == SPARE_ACL {
        return None;
    }
    Some(NatOutboundParams {
        acl_number: SPARE_ACL,
        inside_network: params.inside_network.clone(),
        outside_interface: params.outside_interface.clone(),
    })
}

/// True if `display nat static` output shows the binding.
pub(super) fn static_listed(output: &str, params: &NatStaticParams) -> bool {
    let global = params.outside_ip.to_string();
    let inside = params.inside_ip.to_string();
    output.contains(&global) && output.contains(&inside)
}

/// True if interface `display this` output carries the outbound binding.
pub(super) fn outbound_listed(output: &str, acl_number: u32) -> bool {
    let needle = format!("nat outbound {}", acl_number);
    output.lines().any(|line| line.trim() == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outbound_params() -> NatOutboundParams {
        NatOutboundParams {
            acl_number: 2000,
            inside_network: Some("192.168.1.0 0.0.0.255".into()),
            outside_interface: "GigabitEthernet0/0/1".into(),
        }
    }

    #[test]
    fn outbound_plan_creates_acl_then_binds() {
        let plan = plan_outbound(&outbound_params());
        let texts: Vec<&str> = plan.commands().iter().map(|c| c.text.as_str()).collect();
        assert_eq!(
            texts,
            vec![
                "system-view",
                "acl number 2000",
                "rule 5 permit source 192.168.1.0 0.0.0.255",
                "quit",
                "interface GigabitEthernet0/0/1",
                "nat outbound 2000",
                "quit",
                "quit",
            ]
        );
    }

    #[test]
    fn outbound_plan_without_network_skips_acl_creation() {
        let mut params = outbound_params();
        params.inside_network = None;
        let plan = plan_outbound(&params);
        assert!(!plan.commands().iter().any(|c| c.text.starts_with("acl")));
    }

    #[test]
    fn fallback_switches_to_spare_acl_once() {
        let params = outbound_params();
        let fallback = outbound_fallback(&params).unwrap();
        assert_eq!(fallback.acl_number, SPARE_ACL);
        assert!(outbound_fallback(&fallback).is_none());
    }

    #[test]
    fn fallback_rule_uses_protocol_for_extended_number() {
        let fallback = outbound_fallback(&outbound_params()).unwrap();
        let plan = plan_outbound(&fallback);
        assert!(plan
            .commands()
            .iter()
            .any(|c| c.text == "rule 5 permit ip source 192.168.1.0 0.0.0.255"));
    }

    #[test]
    fn static_plan_allows_overwrite_confirmation() {
        let plan = plan_static(&NatStaticParams {
            inside_ip: "192.168.1.10".parse().unwrap(),
            outside_ip: "203.0.113.10".parse().unwrap(),
        });
        let nat = &plan.commands()[1];
        assert_eq!(nat.text, "nat static global 203.0.113.10 inside 192.168.1.10");
        assert!(nat.may_confirm);
    }

    #[test]
    fn outbound_listing_parse() {
        let output = "#\r\ninterface GigabitEthernet0/0/1\r\n nat outbound 2000\r\n#\r\n";
        assert!(outbound_listed(output, 2000));
        assert!(!outbound_listed(output, 3000));
    }
}
