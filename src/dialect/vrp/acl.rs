//! ACL rule and interface-binding intents.

use serde::{Deserialize, Serialize};

use crate::dialect::{Command, CommandPlan, Mode};
use crate::error::{EngineError, Result};

const RULE_FAMILY: &str = "acl_rule";
const BIND_FAMILY: &str = "acl_bind";

/// Basic ACL number range.
pub const BASIC_RANGE: std::ops::RangeInclusive<u32> = 2000..=2999;
/// Extended ACL number range.
pub const EXTENDED_RANGE: std::ops::RangeInclusive<u32> = 3000..=3999;

/// Rule action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AclAction {
    /// Allow matching traffic.
    Permit,
    /// Drop matching traffic.
    Deny,
}

impl std::fmt::Display for AclAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AclAction::Permit => write!(f, "permit"),
            AclAction::Deny => write!(f, "deny"),
        }
    }
}

/// Protocol selector for extended rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Any IP traffic.
    Ip,
    /// TCP.
    Tcp,
    /// UDP.
    Udp,
    /// ICMP.
    Icmp,
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Protocol::Ip => "ip",
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
            Protocol::Icmp => "icmp",
        };
        f.write_str(name)
    }
}

/// Filter direction on an interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Traffic entering the interface.
    Inbound,
    /// Traffic leaving the interface.
    Outbound,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Inbound => write!(f, "inbound"),
            Direction::Outbound => write!(f, "outbound"),
        }
    }
}

/// Parameters for adding one rule to an ACL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AclRuleParams {
    /// 2000–2999 basic, 3000–3999 extended.
    pub acl_number: u32,
    /// Rule number, 0..2^31-1.
    pub rule_number: u32,
    /// Permit or deny.
    pub action: AclAction,
    /// Source match expression, mandatory.
    pub source: String,
    /// Destination match; extended ACLs only.
    pub destination: Option<String>,
    /// Protocol; required for extended, rejected for basic.
    pub protocol: Option<Protocol>,
    /// Free-form port expression; extended ACLs only.
    pub port_expression: Option<String>,
}

/// Parameters for binding an ACL to an interface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AclBindParams {
    /// Interface name, e.g. `GigabitEthernet0/0/1`.
    pub interface: String,
    /// ACL number, basic or extended.
    pub acl_number: u32,
    /// Filter direction.
    pub direction: Direction,
}

pub(super) fn validate_rule(params: &AclRuleParams) -> Result<()> {
    let basic = BASIC_RANGE.contains(&params.acl_number);
    let extended = EXTENDED_RANGE.contains(&params.acl_number);
    if !basic && !extended {
        return Err(EngineError::parameter(
            RULE_FAMILY,
            format!(
                "acl_number {} outside {}..={} (basic) and {}..={} (extended)",
                params.acl_number,
                BASIC_RANGE.start(),
                BASIC_RANGE.end(),
                EXTENDED_RANGE.start(),
                EXTENDED_RANGE.end()
            ),
        ));
    }
    if params.rule_number > i32::MAX as u32 {
        return Err(EngineError::parameter(RULE_FAMILY, "rule_number exceeds 2^31-1"));
    }
    if params.source.trim().is_empty() {
        return Err(EngineError::parameter(RULE_FAMILY, "source is mandatory"));
    }
    if basic {
        if params.destination.is_some() {
            return Err(EngineError::parameter(
                RULE_FAMILY,
                "basic ACLs do not accept a destination",
            ));
        }
        if params.protocol.is_some() {
            return Err(EngineError::parameter(
                RULE_FAMILY,
                "basic ACLs do not accept a protocol",
            ));
        }
        if params.port_expression.is_some() {
            return Err(EngineError::parameter(
                RULE_FAMILY,
                "basic ACLs do not accept a port expression",
            ));
        }
    } else if params.protocol.is_none() {
        return Err(EngineError::parameter(
            RULE_FAMILY,
            "extended ACLs require a protocol",
        ));
    }
    Ok(())
}

pub(super) fn validate_bind(params: &AclBindParams) -> Result<()> {
    if params.interface.trim().is_empty() {
        return Err(EngineError::parameter(BIND_FAMILY, "interface must be non-empty"));
    }
    if !BASIC_RANGE.contains(&params.acl_number) && !EXTENDED_RANGE.contains(&params.acl_number) {
        return Err(EngineError::parameter(
            BIND_FAMILY,
            format!("acl_number {} outside 2000..=3999", params.acl_number),
        ));
    }
    Ok(())
}

/// The single `rule …` line for the rule parameters.
pub(super) fn rule_line(params: &AclRuleParams) -> String {
    let mut line = format!("rule {} {}", params.rule_number, params.action);
    if let Some(protocol) = params.protocol {
        line.push_str(&format!(" {}", protocol));
    }
    line.push_str(&format!(" source {}", params.source));
    if let Some(destination) = &params.destination {
        line.push_str(&format!(" destination {}", destination));
    }
    if let Some(ports) = &params.port_expression {
        line.push_str(&format!(" {}", ports));
    }
    line
}

pub(super) fn plan_rule(params: &AclRuleParams) -> CommandPlan {
    let acl_ctx = Mode::sub(format!("acl-{}", params.acl_number));
    CommandPlan::new(vec![
        Command::new("system-view", Mode::System),
        Command::new(format!("acl number {}", params.acl_number), acl_ctx.clone()),
        Command::new(rule_line(params), acl_ctx),
        Command::new("quit", Mode::System),
        Command::new("quit", Mode::User),
    ])
}

pub(super) fn plan_bind(params: &AclBindParams) -> CommandPlan {
    let if_ctx = Mode::sub(params.interface.clone());
    CommandPlan::new(vec![
        Command::new("system-view", Mode::System),
        Command::new(format!("interface {}", params.interface), if_ctx.clone()),
        Command::new(
            format!("traffic-filter {} acl {}", params.direction, params.acl_number),
            if_ctx,
        ),
        Command::new("quit", Mode::System),
        Command::new("quit", Mode::User),
    ])
}

/// True if `display acl` output shows the rule number under the ACL.
pub(super) fn rule_listed(output: &str, rule_number: u32) -> bool {
    let needle = format!("rule {} ", rule_number);
    output.lines().any(|line| line.trim_start().starts_with(&needle))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn basic_rule() -> AclRuleParams {
        AclRuleParams {
            acl_number: 2500,
            rule_number: 10,
            action: AclAction::Permit,
            source: "10.0.0.0 0.255.255.255".into(),
            destination: None,
            protocol: None,
            port_expression: None,
        }
    }

    #[test]
    fn boundary_numbers_are_rejected() {
        let mut params = basic_rule();
        params.acl_number = 1999;
        assert!(validate_rule(&params).is_err());
        params.acl_number = 4000;
        assert!(validate_rule(&params).is_err());
        params.acl_number = 2000;
        assert!(validate_rule(&params).is_ok());
    }

    #[test]
    fn basic_rejects_extended_fields() {
        let mut params = basic_rule();
        params.destination = Some("10.0.0.0 0.255.255.255".into());
        assert!(validate_rule(&params).is_err());

        let mut params = basic_rule();
        params.protocol = Some(Protocol::Tcp);
        assert!(validate_rule(&params).is_err());
    }

    #[test]
    fn extended_requires_protocol() {
        let mut params = basic_rule();
        params.acl_number = 3001;
        assert!(validate_rule(&params).is_err());
        params.protocol = Some(Protocol::Tcp);
        assert!(validate_rule(&params).is_ok());
    }

    #[test]
    fn rule_line_composition() {
        let params = AclRuleParams {
            acl_number: 3001,
            rule_number: 5,
            action: AclAction::Deny,
            source: "10.1.0.0 0.0.255.255".into(),
            destination: Some("10.2.0.0 0.0.255.255".into()),
            protocol: Some(Protocol::Tcp),
            port_expression: Some("destination-port eq 22".into()),
        };
        assert_eq!(
            rule_line(&params),
            "rule 5 deny tcp source 10.1.0.0 0.0.255.255 destination 10.2.0.0 0.0.255.255 destination-port eq 22"
        );
    }

    #[test]
    fn bind_plan_shape() {
        let plan = plan_bind(&AclBindParams {
            interface: "GigabitEthernet0/0/1".into(),
            acl_number: 2000,
            direction: Direction::Inbound,
        });
        let texts: Vec<&str> = plan.commands().iter().map(|c| c.text.as_str()).collect();
        assert_eq!(
            texts,
            vec![
                "system-view",
                "interface GigabitEthernet0/0/1",
                "traffic-filter inbound acl 2000",
                "quit",
                "quit",
            ]
        );
    }

    #[test]
    fn rule_listing_parse() {
        let output = "\
Basic ACL 2000, 2 rules\r\n\
 rule 5 permit source 10.0.0.0 0.255.255.255\r\n\
 rule 10 deny\r\n";
        assert!(rule_listed(output, 5));
        assert!(rule_listed(output, 10));
        assert!(!rule_listed(output, 1));
    }
}
