//! Command dialect layer.
//!
//! A dialect translates a typed configuration intent into an ordered,
//! immutable command plan plus a verification probe. Planning is pure:
//! for fixed parameters `plan` always yields an identical sequence. The one
//! supported dialect is [`vrp`]; another vendor slots in behind the
//! [`Dialect`] trait.

pub mod vrp;

pub use vrp::VrpDialect;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::driver::DialogueDriver;
use crate::error::Result;

pub use vrp::acl::{AclAction, AclBindParams, AclRuleParams, Direction, Protocol};
pub use vrp::dhcp::{DhcpPoolParams, ExcludedRange};
pub use vrp::nat::{NatOutboundParams, NatStaticParams};
pub use vrp::stp::{MstInstance, StpInterfaceParams, StpMode, StpParams};

/// Prompt-level scope on the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    /// Top-level user view, prompt `<name>`.
    User,
    /// System view, prompt `[name]`.
    System,
    /// A named sub-context (interface, pool, acl, region), prompt `[name-ctx]`.
    Sub(String),
}

impl Mode {
    /// A sub-context mode with the given label.
    pub fn sub(label: impl Into<String>) -> Self {
        Mode::Sub(label.into())
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::User => write!(f, "user"),
            Mode::System => write!(f, "system"),
            Mode::Sub(label) => write!(f, "sub({})", label),
        }
    }
}

/// What the engine does when the device rejects a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectPolicy {
    /// The rejection is terminal for the intent.
    Terminal,
    /// The rejection is recorded as a warning and execution continues.
    Warning,
    /// NAT-specific: on the Easy-IP marker, replan once with the spare ACL.
    EasyIpFallback,
}

/// One device command, tagged with the mode the dialogue is in after it
/// succeeds and with its rejection policy.
#[derive(Debug, Clone)]
pub struct Command {
    /// Literal command line.
    pub text: String,
    /// Mode after the command completes.
    pub target: Mode,
    /// What a device error marker on this command means.
    pub on_reject: RejectPolicy,
    /// Whether the device may answer with a `[Y/N]:` confirmation, which the
    /// driver acknowledges with `Y`.
    pub may_confirm: bool,
}

impl Command {
    /// A critical command; rejection terminates the intent.
    pub fn new(text: impl Into<String>, target: Mode) -> Self {
        Self {
            text: text.into(),
            target,
            on_reject: RejectPolicy::Terminal,
            may_confirm: false,
        }
    }

    /// Downgrades rejection to a recorded warning.
    pub fn tolerated(mut self) -> Self {
        self.on_reject = RejectPolicy::Warning;
        self
    }

    /// Marks the Easy-IP fallback policy.
    pub fn easy_ip_fallback(mut self) -> Self {
        self.on_reject = RejectPolicy::EasyIpFallback;
        self
    }

    /// Allows a `[Y/N]:` confirmation after this command.
    pub fn confirmable(mut self) -> Self {
        self.may_confirm = true;
        self
    }
}

/// An ordered, immutable command plan.
#[derive(Debug, Clone, Default)]
pub struct CommandPlan {
    commands: Vec<Command>,
}

impl CommandPlan {
    /// Builds a plan from a command list.
    pub fn new(commands: Vec<Command>) -> Self {
        Self { commands }
    }

    /// The commands in issue order.
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Number of commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// True for an empty plan.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// A typed configuration intent. Immutable after construction; parameters
/// are validated by the dialect before any command is issued.
#[derive(Debug, Clone)]
pub enum Intent {
    /// Create or update a DHCP address pool.
    DhcpPool(DhcpPoolParams),
    /// Add one rule to an ACL.
    AclRule(AclRuleParams),
    /// Bind an ACL to an interface as a traffic filter.
    AclBind(AclBindParams),
    /// One-to-one static NAT binding.
    NatStatic(NatStaticParams),
    /// Dynamic/PAT NAT on an outside interface.
    NatOutbound(NatOutboundParams),
    /// Global spanning-tree parameters.
    Stp(StpParams),
    /// Per-interface STP tuning. Contractually unsupported; the dialect
    /// rejects it without issuing commands.
    StpInterface(StpInterfaceParams),
}

impl Intent {
    /// Intent family name used in events and error messages.
    pub fn family(&self) -> &'static str {
        match self {
            Intent::DhcpPool(_) => "dhcp_pool",
            Intent::AclRule(_) => "acl_rule",
            Intent::AclBind(_) => "acl_bind",
            Intent::NatStatic(_) => "nat_static",
            Intent::NatOutbound(_) => "nat_outbound",
            Intent::Stp(_) => "stp",
            Intent::StpInterface(_) => "stp_interface",
        }
    }
}

/// The per-vendor translation layer.
#[async_trait]
pub trait Dialect: Send + Sync {
    /// Checks intent parameters. Must be called (and pass) before `plan`.
    fn validate(&self, intent: &Intent) -> Result<()>;

    /// Translates the intent into an ordered command plan. Deterministic for
    /// fixed parameters.
    fn plan(&self, intent: &Intent) -> Result<CommandPlan>;

    /// Read-only post-condition probe. Re-enters device modes as needed and
    /// returns whether the expected state was observed.
    async fn verify(&self, driver: &mut DialogueDriver, intent: &Intent) -> Result<bool>;

    /// Output substrings that mark a device-side rejection.
    fn error_markers(&self) -> &[&'static str];

    /// A replacement intent for the planned Easy-IP retry, if this intent
    /// has one. Returns `None` once the spare number is already in use.
    fn fallback(&self, intent: &Intent) -> Option<Intent>;
}
