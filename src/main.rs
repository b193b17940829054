//! Fleetconf CLI.
//!
//! Thin shell over the library: loads the YAML inventory, builds the engine
//! with the telnet transport, submits one intent (or runs a probe cycle), and
//! renders the event stream to the terminal.

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use fleetconf::config::EngineConfig;
use fleetconf::dialect::{
    AclAction, AclBindParams, AclRuleParams, DhcpPoolParams, Direction, ExcludedRange, Intent,
    MstInstance, NatOutboundParams, NatStaticParams, Protocol, StpMode, StpParams,
};
use fleetconf::engine::ConfigEngine;
use fleetconf::events::EventKind;
use fleetconf::inventory::load_yaml_inventory;
use fleetconf::transport::TelnetTransport;

#[derive(Parser)]
#[command(
    name = "fleetconf",
    version,
    about = "Configuration engine for a fixed two-region network fleet"
)]
struct Cli {
    /// Path to the YAML device inventory
    #[arg(short, long, global = true, default_value = "inventory.yml", env = "FLEETCONF_INVENTORY")]
    inventory: PathBuf,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one reachability probe cycle and print edge states
    Probe,
    /// Create or update a DHCP address pool on a device
    DhcpPool(DhcpPoolArgs),
    /// Add one rule to an ACL
    AclRule(AclRuleArgs),
    /// Bind an ACL to an interface as a traffic filter
    AclBind(AclBindArgs),
    /// Configure a one-to-one static NAT binding
    NatStatic(NatStaticArgs),
    /// Configure dynamic NAT on an outside interface
    NatOutbound(NatOutboundArgs),
    /// Configure global spanning-tree parameters
    Stp(StpArgs),
}

#[derive(Args)]
struct DhcpPoolArgs {
    /// Target device display name
    device: String,
    /// Pool name
    #[arg(long)]
    pool: String,
    /// Network: `A.B.C.D/len`, `A.B.C.D mask M.M.M.M`, or bare `A.B.C.D`
    #[arg(long)]
    network: String,
    /// Default gateway
    #[arg(long)]
    gateway: Option<Ipv4Addr>,
    /// DNS server, repeatable; at most two are used
    #[arg(long = "dns")]
    dns: Vec<Ipv4Addr>,
    /// Excluded address or range, `A.B.C.D` or `A.B.C.D-E.F.G.H`
    #[arg(long)]
    excluded: Option<String>,
    /// Domain name handed to clients
    #[arg(long)]
    domain: Option<String>,
    /// Lease in days (default 3)
    #[arg(long)]
    lease_days: Option<u32>,
}

#[derive(Args)]
struct AclRuleArgs {
    /// Target device display name
    device: String,
    /// ACL number: 2000-2999 basic, 3000-3999 extended
    #[arg(long)]
    acl: u32,
    /// Rule number
    #[arg(long)]
    rule: u32,
    /// permit or deny
    #[arg(long)]
    action: String,
    /// Source match expression, e.g. `10.0.0.0 0.255.255.255`
    #[arg(long)]
    source: String,
    /// Destination match (extended ACLs only)
    #[arg(long)]
    destination: Option<String>,
    /// Protocol: ip, tcp, udp, icmp (extended ACLs only)
    #[arg(long)]
    protocol: Option<String>,
    /// Port expression, e.g. `destination-port eq 22` (extended ACLs only)
    #[arg(long)]
    ports: Option<String>,
}

#[derive(Args)]
struct AclBindArgs {
    /// Target device display name
    device: String,
    /// Interface name
    #[arg(long)]
    interface: String,
    /// ACL number
    #[arg(long)]
    acl: u32,
    /// inbound or outbound
    #[arg(long)]
    direction: String,
}

#[derive(Args)]
struct NatStaticArgs {
    /// Target device display name
    device: String,
    /// Inside (private) address
    #[arg(long)]
    inside: Ipv4Addr,
    /// Outside (global) address
    #[arg(long)]
    outside: Ipv4Addr,
}

#[derive(Args)]
struct NatOutboundArgs {
    /// Target device display name
    device: String,
    /// ACL selecting the inside networks
    #[arg(long)]
    acl: u32,
    /// Inside network as `address wildcard`; when given, the ACL is created
    #[arg(long)]
    inside_network: Option<String>,
    /// Outside interface name
    #[arg(long)]
    interface: String,
}

#[derive(Args)]
struct StpArgs {
    /// Target device display name
    device: String,
    /// stp, rstp, or mstp
    #[arg(long)]
    mode: String,
    /// Bridge priority, multiple of 4096 in 0..=61440
    #[arg(long, default_value_t = 32768)]
    priority: u32,
    /// Forward delay in seconds
    #[arg(long, default_value_t = 15)]
    forward_delay: u32,
    /// Hello interval in seconds
    #[arg(long, default_value_t = 2)]
    hello: u32,
    /// Max age in seconds
    #[arg(long, default_value_t = 20)]
    max_age: u32,
    /// MST region name (mstp only)
    #[arg(long)]
    region_name: Option<String>,
    /// MST revision (mstp only)
    #[arg(long)]
    revision: Option<u32>,
    /// MST instance mapping `N:VLANS`, repeatable (mstp only)
    #[arg(long = "instance")]
    instances: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let repository = Arc::new(
        load_yaml_inventory(&cli.inventory)
            .with_context(|| format!("loading inventory from {}", cli.inventory.display()))?,
    );
    let engine = ConfigEngine::new(
        repository,
        Arc::new(TelnetTransport::new()),
        EngineConfig::from_env(),
    );

    let exit_code = match cli.command {
        Commands::Probe => run_probe(&engine).await,
        Commands::DhcpPool(args) => {
            let device = args.device.clone();
            run_intent(&engine, &device, dhcp_intent(args)?).await
        }
        Commands::AclRule(args) => {
            let device = args.device.clone();
            run_intent(&engine, &device, acl_rule_intent(args)?).await
        }
        Commands::AclBind(args) => {
            let device = args.device.clone();
            run_intent(&engine, &device, acl_bind_intent(args)?).await
        }
        Commands::NatStatic(args) => {
            let device = args.device.clone();
            let intent = Intent::NatStatic(NatStaticParams {
                inside_ip: args.inside,
                outside_ip: args.outside,
            });
            run_intent(&engine, &device, intent).await
        }
        Commands::NatOutbound(args) => {
            let device = args.device.clone();
            let intent = Intent::NatOutbound(NatOutboundParams {
                acl_number: args.acl,
                inside_network: args.inside_network,
                outside_interface: args.interface,
            });
            run_intent(&engine, &device, intent).await
        }
        Commands::Stp(args) => {
            let device = args.device.clone();
            run_intent(&engine, &device, stp_intent(args)?).await
        }
    };

    std::process::exit(exit_code);
}

fn init_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(verbosity >= 3))
        .with(env_filter)
        .init();
}

async fn run_probe(engine: &Arc<ConfigEngine>) -> i32 {
    engine.probe_once().await;
    let snapshot = engine.current_snapshot();
    println!(
        "snapshot generation {} ({} edges, {} up)",
        snapshot.generation,
        snapshot.states().count(),
        snapshot.up_count()
    );
    for (edge, state) in snapshot.states() {
        println!("  {:<30} {}", edge.to_string(), state);
    }
    0
}

async fn run_intent(engine: &Arc<ConfigEngine>, device: &str, intent: Intent) -> i32 {
    let stream_id = engine.submit_intent(device, intent);
    let mut events = engine.events(stream_id);
    let mut exit_code = 1;
    while let Some(event) = events.recv().await {
        match event.kind {
            EventKind::ProgressLine { line } => println!("   - {}", line),
            EventKind::CommandIssued { command } => println!("  >> {}", command),
            EventKind::CommandOutput { output, .. } => {
                for line in output.lines().filter(|l| !l.trim().is_empty()) {
                    println!("     {}", line);
                }
            }
            EventKind::Warning { message } => println!("  !! {}", message),
            EventKind::TerminalSuccess { intent } => {
                println!("ok: {} applied on {}", intent, device);
                exit_code = 0;
            }
            EventKind::TerminalFailure { reason, message } => {
                eprintln!("failed ({}): {}", reason, message);
            }
        }
    }
    exit_code
}

fn dhcp_intent(args: DhcpPoolArgs) -> Result<Intent> {
    let excluded = match args.excluded {
        Some(spec) => Some(parse_excluded(&spec)?),
        None => None,
    };
    Ok(Intent::DhcpPool(DhcpPoolParams {
        pool_name: args.pool,
        network: args.network,
        gateway: args.gateway,
        dns: args.dns,
        excluded,
        domain: args.domain,
        lease_days: args.lease_days,
    }))
}

fn acl_rule_intent(args: AclRuleArgs) -> Result<Intent> {
    let protocol = match args.protocol.as_deref() {
        Some(p) => Some(parse_protocol(p)?),
        None => None,
    };
    Ok(Intent::AclRule(AclRuleParams {
        acl_number: args.acl,
        rule_number: args.rule,
        action: parse_action(&args.action)?,
        source: args.source,
        destination: args.destination,
        protocol,
        port_expression: args.ports,
    }))
}

fn acl_bind_intent(args: AclBindArgs) -> Result<Intent> {
    Ok(Intent::AclBind(AclBindParams {
        interface: args.interface,
        acl_number: args.acl,
        direction: parse_direction(&args.direction)?,
    }))
}

fn stp_intent(args: StpArgs) -> Result<Intent> {
    let instances = args
        .instances
        .iter()
        .map(|spec| parse_instance(spec))
        .collect::<Result<Vec<_>>>()?;
    Ok(Intent::Stp(StpParams {
        mode: parse_stp_mode(&args.mode)?,
        priority: args.priority,
        forward_delay: args.forward_delay,
        hello: args.hello,
        max_age: args.max_age,
        region_name: args.region_name,
        revision: args.revision,
        instances,
    }))
}

fn parse_action(raw: &str) -> Result<AclAction> {
    match raw.to_ascii_lowercase().as_str() {
        "permit" => Ok(AclAction::Permit),
        "deny" => Ok(AclAction::Deny),
        other => bail!("unknown action '{}', expected permit or deny", other),
    }
}

fn parse_protocol(raw: &str) -> Result<Protocol> {
    match raw.to_ascii_lowercase().as_str() {
        "ip" => Ok(Protocol::Ip),
        "tcp" => Ok(Protocol::Tcp),
        "udp" => Ok(Protocol::Udp),
        "icmp" => Ok(Protocol::Icmp),
        other => bail!("unknown protocol '{}', expected ip, tcp, udp, or icmp", other),
    }
}

fn parse_direction(raw: &str) -> Result<Direction> {
    match raw.to_ascii_lowercase().as_str() {
        "inbound" => Ok(Direction::Inbound),
        "outbound" => Ok(Direction::Outbound),
        other => bail!("unknown direction '{}', expected inbound or outbound", other),
    }
}

fn parse_stp_mode(raw: &str) -> Result<StpMode> {
    match raw.to_ascii_lowercase().as_str() {
        "stp" => Ok(StpMode::Stp),
        "rstp" => Ok(StpMode::Rstp),
        "mstp" => Ok(StpMode::Mstp),
        other => bail!("unknown stp mode '{}', expected stp, rstp, or mstp", other),
    }
}

fn parse_excluded(spec: &str) -> Result<ExcludedRange> {
    let mut parts = spec.splitn(2, '-');
    let start = parts
        .next()
        .unwrap_or_default()
        .trim()
        .parse()
        .with_context(|| format!("bad excluded address in '{}'", spec))?;
    let end = match parts.next() {
        Some(raw) => Some(
            raw.trim()
                .parse()
                .with_context(|| format!("bad excluded range end in '{}'", spec))?,
        ),
        None => None,
    };
    Ok(ExcludedRange { start, end })
}

fn parse_instance(spec: &str) -> Result<MstInstance> {
    let (instance, vlans) = spec
        .split_once(':')
        .with_context(|| format!("bad instance mapping '{}', expected N:VLANS", spec))?;
    Ok(MstInstance {
        instance: instance
            .trim()
            .parse()
            .with_context(|| format!("bad instance number in '{}'", spec))?,
        vlans: vlans.trim().to_string(),
    })
}
