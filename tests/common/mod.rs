//! Scripted device transport for engine integration tests.
//!
//! The fake models just enough of the device's interactive behavior: the
//! mode/prompt hierarchy, a handful of configuration contexts, the save
//! confirmation, and the display probes the verification layer reads. Every
//! session opened against one transport shares the same device state, so a
//! follow-up intent observes what an earlier one configured.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use regex::Regex;
use secrecy::SecretString;

use fleetconf::inventory::{Credential, Device, DeviceId, Layer, Region, Tenant};
use fleetconf::transport::{Endpoint, Session, Transport, TransportError, TransportResult};

pub const EASY_IP_LINE: &str = "Error: Easy IP already configured on this interface";

/// Behavior knobs for a scripted device.
#[derive(Debug, Clone, Default)]
pub struct DeviceScript {
    /// First `nat outbound` with a non-spare ACL fails with the Easy-IP line.
    pub easy_ip_conflict: bool,
    /// Commands containing this substring are rejected with `Error:`.
    pub fail_substring: Option<String>,
    /// Display probes show nothing, so verification always fails.
    pub verify_blind: bool,
    /// Artificial latency per read, for cancellation and overlap tests.
    pub response_delay: Option<Duration>,
}

/// What the scripted device has accepted so far.
#[derive(Debug, Default)]
pub struct DeviceState {
    pub issued: Vec<String>,
    pools: Vec<String>,
    acl_rules: Vec<(u32, String)>,
    interface_lines: Vec<(String, String)>,
    nat_static: Vec<String>,
    stp_mode: Option<String>,
    stp_priority: Option<u32>,
}

#[derive(Debug, Clone)]
enum Ctx {
    System,
    Pool(String),
    Acl(u32),
    Interface(String),
    Region,
}

/// Transport whose sessions talk to one shared scripted device.
pub struct ScriptedTransport {
    name: String,
    script: DeviceScript,
    state: Arc<Mutex<DeviceState>>,
    opens: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
    active: Arc<AtomicUsize>,
    max_active: Arc<AtomicUsize>,
}

impl ScriptedTransport {
    pub fn new(name: impl Into<String>, script: DeviceScript) -> Self {
        Self {
            name: name.into(),
            script,
            state: Arc::new(Mutex::new(DeviceState::default())),
            opens: Arc::new(AtomicUsize::new(0)),
            closes: Arc::new(AtomicUsize::new(0)),
            active: Arc::new(AtomicUsize::new(0)),
            max_active: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn state(&self) -> Arc<Mutex<DeviceState>> {
        Arc::clone(&self.state)
    }

    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Sessions that were explicitly closed, as opposed to merely dropped.
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn max_concurrent_sessions(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn open(
        &self,
        _endpoint: &Endpoint,
        _credential: &Credential,
        _login_timeout: Duration,
    ) -> TransportResult<Box<dyn Session>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        Ok(Box::new(ScriptedSession {
            name: self.name.clone(),
            script: self.script.clone(),
            state: Arc::clone(&self.state),
            stack: Vec::new(),
            pending: None,
            closes: Arc::clone(&self.closes),
            active: Arc::clone(&self.active),
        }))
    }
}

struct ScriptedSession {
    name: String,
    script: DeviceScript,
    state: Arc<Mutex<DeviceState>>,
    stack: Vec<Ctx>,
    pending: Option<String>,
    closes: Arc<AtomicUsize>,
    active: Arc<AtomicUsize>,
}

impl Drop for ScriptedSession {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Session for ScriptedSession {
    async fn expect(&mut self, pattern: &Regex, timeout: Duration) -> TransportResult<String> {
        if let Some(delay) = self.script.response_delay {
            tokio::time::sleep(delay).await;
        }
        match self.pending.take() {
            Some(response) if pattern.is_match(response.trim_end_matches(['\r', '\n'])) => {
                Ok(response)
            }
            _ => Err(TransportError::Timeout { timeout }),
        }
    }

    async fn send_line(&mut self, line: &str) -> TransportResult<()> {
        let response = self.respond(line);
        self.pending = Some(response);
        Ok(())
    }

    async fn send_secret(&mut self, _secret: &SecretString) -> TransportResult<()> {
        Ok(())
    }

    async fn close(&mut self) -> TransportResult<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl ScriptedSession {
    fn prompt(&self) -> String {
        match self.stack.last() {
            None => format!("<{}>", self.name),
            Some(Ctx::System) => format!("[{}]", self.name),
            Some(Ctx::Pool(pool)) => format!("[{}-ip-pool-{}]", self.name, pool.to_lowercase()),
            Some(Ctx::Acl(number)) => format!("[{}-acl-{}]", self.name, number),
            Some(Ctx::Interface(name)) => format!("[{}-{}]", self.name, name),
            Some(Ctx::Region) => format!("[{}-mst-region]", self.name),
        }
    }

    fn ok(&self) -> String {
        format!("\r\n{}", self.prompt())
    }

    fn error(&self, line: &str) -> String {
        format!("\r\n{}\r\n{}", line, self.prompt())
    }

    fn respond(&mut self, line: &str) -> String {
        self.state.lock().issued.push(line.to_string());

        if let Some(substring) = self.script.fail_substring.clone() {
            if line.contains(substring.as_str()) {
                return self.error("Error: command rejected");
            }
        }

        if self.stack.is_empty() {
            return self.respond_user(line);
        }
        self.respond_config(line)
    }

    fn respond_user(&mut self, line: &str) -> String {
        match line {
            "system-view" => {
                self.stack.push(Ctx::System);
                self.ok()
            }
            "save" => "\r\nThe current configuration will be written to the device.\r\nAre you sure to continue?[Y/N]:".to_string(),
            "Y" => format!("\r\nInfo: Save the configuration successfully.\r\n{}", self.prompt()),
            "display ip pool" => self.display_pools(),
            "display nat static" => self.display_nat_static(),
            "display stp brief" | "display stp global" => self.display_stp(),
            _ if line.starts_with("display acl ") => self.display_acl(line),
            _ => self.ok(),
        }
    }

    fn respond_config(&mut self, line: &str) -> String {
        if line == "quit" {
            self.stack.pop();
            return self.ok();
        }

        let ctx = self.stack.last().cloned();
        match ctx {
            Some(Ctx::System) => self.respond_system(line),
            Some(Ctx::Pool(_)) => self.ok(),
            Some(Ctx::Acl(number)) => {
                if line.starts_with("rule ") {
                    self.state.lock().acl_rules.push((number, line.to_string()));
                }
                self.ok()
            }
            Some(Ctx::Interface(interface)) => self.respond_interface(&interface, line),
            Some(Ctx::Region) => self.ok(),
            None => self.ok(),
        }
    }

    fn respond_system(&mut self, line: &str) -> String {
        if let Some(pool) = line.strip_prefix("ip pool ") {
            self.state.lock().pools.push(pool.to_string());
            self.stack.push(Ctx::Pool(pool.to_string()));
            return self.ok();
        }
        if let Some(number) = line.strip_prefix("acl number ") {
            match number.trim().parse() {
                Ok(number) => self.stack.push(Ctx::Acl(number)),
                Err(_) => return self.error("Error: bad ACL number"),
            }
            return self.ok();
        }
        if let Some(interface) = line.strip_prefix("interface ") {
            self.stack.push(Ctx::Interface(interface.to_string()));
            return self.ok();
        }
        if line == "stp region-configuration" {
            self.stack.push(Ctx::Region);
            return self.ok();
        }
        if let Some(mode) = line.strip_prefix("stp mode ") {
            self.state.lock().stp_mode = Some(mode.to_string());
            return self.ok();
        }
        if let Some(priority) = line.strip_prefix("stp priority ") {
            self.state.lock().stp_priority = priority.trim().parse().ok();
            return self.ok();
        }
        if line.starts_with("nat static global ") {
            self.state.lock().nat_static.push(line.to_string());
            return self.ok();
        }
        self.ok()
    }

    fn respond_interface(&mut self, interface: &str, line: &str) -> String {
        if line == "display this" {
            return self.display_this(interface);
        }
        if let Some(acl) = line.strip_prefix("nat outbound ") {
            let spare = acl.trim() == "3000";
            if self.script.easy_ip_conflict && !spare {
                return self.error(EASY_IP_LINE);
            }
        }
        if line.starts_with("nat outbound ") || line.starts_with("traffic-filter ") {
            self.state
                .lock()
                .interface_lines
                .push((interface.to_string(), line.to_string()));
        }
        self.ok()
    }

    fn display_pools(&self) -> String {
        if self.script.verify_blind {
            return self.ok();
        }
        let state = self.state.lock();
        let mut out = String::from("\r\n");
        for pool in &state.pools {
            out.push_str(&format!("  Pool-name      : {}\r\n", pool));
            out.push_str("  Pool-No        : 0\r\n");
        }
        out.push_str(&self.prompt());
        out
    }

    fn display_acl(&self, line: &str) -> String {
        if self.script.verify_blind {
            return self.ok();
        }
        let wanted: Option<u32> = line
            .strip_prefix("display acl ")
            .and_then(|n| n.trim().parse().ok());
        let state = self.state.lock();
        let mut out = String::from("\r\n");
        for (number, rule) in &state.acl_rules {
            if Some(*number) == wanted {
                out.push_str(&format!(" {}\r\n", rule));
            }
        }
        out.push_str(&self.prompt());
        out
    }

    fn display_nat_static(&self) -> String {
        if self.script.verify_blind {
            return self.ok();
        }
        let state = self.state.lock();
        let mut out = String::from("\r\n");
        for entry in &state.nat_static {
            out.push_str(&format!(" {}\r\n", entry));
        }
        out.push_str(&self.prompt());
        out
    }

    fn display_stp(&self) -> String {
        if self.script.verify_blind {
            return self.ok();
        }
        let state = self.state.lock();
        let mut out = String::from("\r\n");
        if let Some(mode) = &state.stp_mode {
            out.push_str(&format!(" Protocol mode      : {}\r\n", mode));
        }
        if let Some(priority) = state.stp_priority {
            out.push_str(&format!(" Bridge priority    : {}\r\n", priority));
        }
        out.push_str(&self.prompt());
        out
    }

    fn display_this(&self, interface: &str) -> String {
        if self.script.verify_blind {
            return self.ok();
        }
        let state = self.state.lock();
        let mut out = format!("\r\n#\r\ninterface {}\r\n", interface);
        for (bound_interface, line) in &state.interface_lines {
            if bound_interface == interface {
                out.push_str(&format!(" {}\r\n", line));
            }
        }
        out.push_str("#\r\n");
        out.push_str(&self.prompt());
        out
    }
}

/// One inventory device named to match a scripted transport.
pub fn test_device(name: &str) -> Device {
    Device {
        id: DeviceId::new(name.to_lowercase()),
        name: name.to_string(),
        vendor: Default::default(),
        address: "10.1.200.1".parse().expect("test address"),
        port: 23,
        credentials: Credential::new("admin", "admin"),
        region: Region::R1,
        tenant: Tenant::A,
        layer: Layer::Access,
    }
}
