//! ICMP reachability checks via the system `ping` binary.
//!
//! Shelling out keeps the process unprivileged; raw ICMP sockets would need
//! CAP_NET_RAW. The trait exists so the prober tests can script reachability
//! without touching the network.

use std::net::IpAddr;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{trace, warn};

/// Sends one reachability probe to an address.
#[async_trait]
pub trait Pinger: Send + Sync {
    /// True if the address answered within the deadline.
    async fn ping(&self, addr: IpAddr, timeout: Duration) -> bool;
}

/// Production pinger backed by the system `ping` binary.
#[derive(Debug, Default)]
pub struct SystemPinger;

impl SystemPinger {
    /// Creates the pinger.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Pinger for SystemPinger {
    async fn ping(&self, addr: IpAddr, timeout: Duration) -> bool {
        let wait_secs = timeout.as_secs().max(1);
        let mut command = Command::new("ping");
        command
            .arg("-c")
            .arg("1")
            .arg("-W")
            .arg(wait_secs.to_string())
            .arg(addr.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        // The outer deadline guards against a ping binary that ignores -W.
        let outer = timeout + Duration::from_secs(1);
        match tokio::time::timeout(outer, command.status()).await {
            Ok(Ok(status)) => {
                trace!(%addr, success = status.success(), "ping attempt");
                status.success()
            }
            Ok(Err(e)) => {
                warn!(%addr, error = %e, "failed to spawn ping");
                false
            }
            Err(_) => {
                trace!(%addr, "ping attempt exceeded outer deadline");
                false
            }
        }
    }
}
