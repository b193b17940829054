//! Session transport layer.
//!
//! A transport opens a line-oriented interactive session to a device's
//! management port, performs the login exchange, and hands the engine a
//! [`Session`] it can drive with `expect`/`send_line`. The transport is a
//! trait so tests supply scripted fakes; the production implementation is
//! [`TelnetTransport`] over plain TCP.

mod telnet;

pub use telnet::TelnetTransport;

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use secrecy::SecretString;
use thiserror::Error;

use crate::inventory::Credential;

/// Username prompt pattern seen at the start of the login exchange.
pub static USERNAME_PROMPT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)username:\s*$").unwrap());

/// Password prompt pattern.
pub static PASSWORD_PROMPT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)password:\s*$").unwrap());

/// Top-level command prompt, e.g. `<R1>`.
pub static USER_PROMPT: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^<>\r\n]+>\s*$").unwrap());

/// Errors from the transport layer.
#[derive(Error, Debug)]
pub enum TransportError {
    /// TCP connect failed or was refused.
    #[error("Connect failed: {0}")]
    ConnectFailed(String),

    /// The login exchange did not complete; the message never contains the
    /// secret.
    #[error("Login failed: {0}")]
    LoginFailed(String),

    /// A read deadline was exceeded while waiting for a prompt.
    #[error("Read timed out after {:.1}s", timeout.as_secs_f64())]
    Timeout {
        /// The deadline that was exceeded
        timeout: Duration,
    },

    /// The peer closed the connection.
    #[error("Connection closed by peer")]
    Closed,

    /// Underlying socket error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Where a session connects to, carrying the device name for log context.
#[derive(Debug, Clone)]
pub struct Endpoint {
    /// Device display name (log context only).
    pub name: String,
    /// Management socket address.
    pub addr: SocketAddr,
}

impl Endpoint {
    /// Creates an endpoint.
    pub fn new(name: impl Into<String>, addr: SocketAddr) -> Self {
        Self {
            name: name.into(),
            addr,
        }
    }
}

/// One live interactive dialogue with a device.
///
/// Reads are bounded by an explicit deadline; `close` is idempotent and the
/// engine guarantees it runs on every exit path.
#[async_trait]
pub trait Session: Send {
    /// Reads until `pattern` matches the accumulated output or the deadline
    /// passes. Returns everything read up to and including the match.
    ///
    /// Device bytes are treated as ASCII; undecodable bytes are replaced with
    /// U+FFFD rather than failing.
    async fn expect(&mut self, pattern: &Regex, timeout: Duration) -> TransportResult<String>;

    /// Writes one command line, appending the line terminator.
    async fn send_line(&mut self, line: &str) -> TransportResult<()>;

    /// Writes a secret line. Identical wire behavior to `send_line`, but the
    /// implementation must not log the payload.
    async fn send_secret(&mut self, secret: &SecretString) -> TransportResult<()>;

    /// Closes the session. Safe to call more than once.
    async fn close(&mut self) -> TransportResult<()>;
}

/// Opens sessions to devices. Implemented by [`TelnetTransport`] in
/// production and by scripted fakes in tests.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connects, performs the login exchange, and returns a session sitting
    /// at the top-level command prompt. The deadline covers the whole login.
    async fn open(
        &self,
        endpoint: &Endpoint,
        credential: &Credential,
        login_timeout: Duration,
    ) -> TransportResult<Box<dyn Session>>;
}
