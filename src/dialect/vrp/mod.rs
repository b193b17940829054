//! The supported vendor dialect (VRP-style command line).
//!
//! Each intent family lives in its own submodule as pure validate/plan
//! functions plus output-parsing helpers; this module stitches them into the
//! [`Dialect`] trait and owns the verification probes, which are the only
//! dialect code that touches a live dialogue.

pub mod acl;
pub mod dhcp;
pub mod nat;
pub mod stp;

mod net;

pub use nat::{EASY_IP_MARKER, SPARE_ACL};
pub use net::{mask_from_prefix, prefix_from_mask, NetworkForm};

use async_trait::async_trait;
use tracing::debug;

use crate::driver::DialogueDriver;
use crate::error::{EngineError, Result};

use super::{Command, CommandPlan, Dialect, Intent, Mode};

/// Output substrings that mark a device-side rejection.
const ERROR_MARKERS: &[&str] = &[
    "Error:",
    "Unrecognized command",
    "Incomplete command",
    "Wrong parameter",
    EASY_IP_MARKER,
];

/// The VRP command dialect.
#[derive(Debug, Default)]
pub struct VrpDialect;

impl VrpDialect {
    /// Creates the dialect.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Dialect for VrpDialect {
    fn validate(&self, intent: &Intent) -> Result<()> {
        match intent {
            Intent::DhcpPool(params) => dhcp::validate(params),
            Intent::AclRule(params) => acl::validate_rule(params),
            Intent::AclBind(params) => acl::validate_bind(params),
            Intent::NatStatic(params) => nat::validate_static(params),
            Intent::NatOutbound(params) => nat::validate_outbound(params),
            Intent::Stp(params) => stp::validate(params),
            Intent::StpInterface(_) => Err(EngineError::Unsupported(
                "per-interface STP tuning is not supported".into(),
            )),
        }
    }

    fn plan(&self, intent: &Intent) -> Result<CommandPlan> {
        match intent {
            Intent::DhcpPool(params) => dhcp::plan(params),
            Intent::AclRule(params) => Ok(acl::plan_rule(params)),
            Intent::AclBind(params) => Ok(acl::plan_bind(params)),
            Intent::NatStatic(params) => Ok(nat::plan_static(params)),
            Intent::NatOutbound(params) => Ok(nat::plan_outbound(params)),
            Intent::Stp(params) => Ok(stp::plan(params)),
            Intent::StpInterface(_) => Err(EngineError::Unsupported(
                "per-interface STP tuning is not supported".into(),
            )),
        }
    }

    async fn verify(&self, driver: &mut DialogueDriver, intent: &Intent) -> Result<bool> {
        let observed = match intent {
            Intent::DhcpPool(params) => {
                let output = probe(driver, "display ip pool", Mode::User).await?;
                dhcp::pool_listed(&output, &params.pool_name)
            }
            Intent::AclRule(params) => {
                let output = probe(
                    driver,
                    &format!("display acl {}", params.acl_number),
                    Mode::User,
                )
                .await?;
                acl::rule_listed(&output, params.rule_number)
            }
            Intent::AclBind(params) => {
                let output = interface_config(driver, &params.interface).await?;
                output.lines().any(|line| {
                    line.trim()
                        == format!("traffic-filter {} acl {}", params.direction, params.acl_number)
                })
            }
            Intent::NatStatic(params) => {
                let output = probe(driver, "display nat static", Mode::User).await?;
                nat::static_listed(&output, params)
            }
            Intent::NatOutbound(params) => {
                let output = interface_config(driver, &params.outside_interface).await?;
                nat::outbound_listed(&output, params.acl_number)
            }
            Intent::Stp(params) => {
                let brief = probe(driver, "display stp brief", Mode::User).await?;
                let global = probe(driver, "display stp global", Mode::User).await?;
                stp::stp_applied(&brief, &global, params)
            }
            Intent::StpInterface(_) => {
                return Err(EngineError::Unsupported(
                    "per-interface STP tuning is not supported".into(),
                ))
            }
        };
        debug!(intent = intent.family(), observed, "verification probe");
        Ok(observed)
    }

    fn error_markers(&self) -> &[&'static str] {
        ERROR_MARKERS
    }

    fn fallback(&self, intent: &Intent) -> Option<Intent> {
        match intent {
            Intent::NatOutbound(params) => {
                nat::outbound_fallback(params).map(Intent::NatOutbound)
            }
            _ => None,
        }
    }
}

/// Issues a read-only probe, mapping dialogue failures into the engine
/// taxonomy.
async fn probe(driver: &mut DialogueDriver, text: &str, target: Mode) -> Result<String> {
    let host = driver.device_name().to_string();
    let output = driver.probe(text, target).await;
    output.map_err(|e| e.into_engine(&host))
}

/// Runs one navigation command during verification.
async fn step(driver: &mut DialogueDriver, command: Command) -> Result<()> {
    let host = driver.device_name().to_string();
    let outcome = driver.run(&command).await;
    outcome.map_err(|e| e.into_engine(&host))?;
    Ok(())
}

/// Re-enters the interface sub-context, captures `display this`, and returns
/// the dialogue to user view.
async fn interface_config(driver: &mut DialogueDriver, interface: &str) -> Result<String> {
    let if_ctx = Mode::sub(interface.to_string());
    step(driver, Command::new("system-view", Mode::System)).await?;
    step(driver, Command::new(format!("interface {}", interface), if_ctx.clone())).await?;
    let output = probe(driver, "display this", if_ctx).await?;
    step(driver, Command::new("quit", Mode::System)).await?;
    step(driver, Command::new("quit", Mode::User)).await?;
    Ok(output)
}
