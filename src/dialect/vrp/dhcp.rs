//! DHCP pool intent: validation, planning, verification parsing.

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use crate::dialect::{Command, CommandPlan, Mode};
use crate::error::{EngineError, Result};

use super::net::NetworkForm;

const FAMILY: &str = "dhcp_pool";

/// Default lease when the caller omits one, in days.
pub const DEFAULT_LEASE_DAYS: u32 = 3;

/// Excluded address or address range within the pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExcludedRange {
    /// First excluded address.
    pub start: Ipv4Addr,
    /// Last excluded address; `None` excludes only `start`.
    pub end: Option<Ipv4Addr>,
}

/// Parameters for creating or updating a DHCP address pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DhcpPoolParams {
    /// Pool label, non-empty.
    pub pool_name: String,
    /// Network in one of the three accepted forms (see [`NetworkForm`]).
    pub network: String,
    /// Optional default gateway, issued before the network on purpose: some
    /// devices require the pool's gateway before its network.
    pub gateway: Option<Ipv4Addr>,
    /// DNS servers; at most two are used, later entries are dropped.
    #[serde(default)]
    pub dns: Vec<Ipv4Addr>,
    /// Excluded address or range.
    pub excluded: Option<ExcludedRange>,
    /// Optional domain name, non-empty when present.
    pub domain: Option<String>,
    /// Lease in days; defaults to 3, must be positive when given.
    pub lease_days: Option<u32>,
}

pub(super) fn validate(params: &DhcpPoolParams) -> Result<()> {
    if params.pool_name.trim().is_empty() {
        return Err(EngineError::parameter(FAMILY, "pool_name must be non-empty"));
    }
    params
        .network
        .parse::<NetworkForm>()
        .map_err(|e| EngineError::parameter(FAMILY, e))?;
    if let Some(domain) = &params.domain {
        if domain.trim().is_empty() {
            return Err(EngineError::parameter(FAMILY, "domain must be non-empty when present"));
        }
    }
    if params.lease_days == Some(0) {
        return Err(EngineError::parameter(FAMILY, "lease_days must be positive"));
    }
    Ok(())
}

pub(super) fn plan(params: &DhcpPoolParams) -> Result<CommandPlan> {
    // Validation already passed, so the parse cannot fail here.
    let network: NetworkForm = params
        .network
        .parse()
        .map_err(|e: String| EngineError::parameter(FAMILY, e))?;
    let pool_ctx = Mode::sub(format!("ip-pool-{}", params.pool_name.to_lowercase()));

    let mut commands = vec![
        Command::new("system-view", Mode::System),
        Command::new(format!("ip pool {}", params.pool_name), pool_ctx.clone()),
    ];

    if let Some(gateway) = params.gateway {
        commands.push(Command::new(
            format!("gateway-list {}", gateway),
            pool_ctx.clone(),
        ));
    }

    commands.push(Command::new(network.command_line(), pool_ctx.clone()));

    if let Some(excluded) = &params.excluded {
        let text = match excluded.end {
            Some(end) => format!("excluded-ip-address {} {}", excluded.start, end),
            None => format!("excluded-ip-address {}", excluded.start),
        };
        commands.push(Command::new(text, pool_ctx.clone()).tolerated());
    }

    for dns in params.dns.iter().take(2) {
        commands.push(Command::new(format!("dns-list {}", dns), pool_ctx.clone()).tolerated());
    }

    if let Some(domain) = &params.domain {
        commands.push(Command::new(format!("domain-name {}", domain), pool_ctx.clone()).tolerated());
    }

    // Always present, even when the caller omitted the lease.
    let lease = params.lease_days.unwrap_or(DEFAULT_LEASE_DAYS);
    commands.push(Command::new(format!("lease day {}", lease), pool_ctx).tolerated());

    commands.push(Command::new("quit", Mode::System));
    commands.push(Command::new("quit", Mode::User));
    commands.push(Command::new("save", Mode::User).confirmable());

    Ok(CommandPlan::new(commands))
}

/// True if `display ip pool` output lists a pool whose label equals `name`.
pub(super) fn pool_listed(output: &str, name: &str) -> bool {
    output.lines().any(|line| {
        let mut fields = line.splitn(2, ':');
        match (fields.next(), fields.next()) {
            (Some(key), Some(value)) => {
                key.trim().eq_ignore_ascii_case("pool-name") && value.trim() == name
            }
            _ => false,
        }
    })
}
