//! Plain-TCP line transport for the unencrypted management protocol.
//!
//! The wire dialogue is `Username:` / user id / `Password:` / secret /
//! top-level prompt. Every read is bounded by a deadline computed from the
//! caller's timeout; output is decoded lossily so stray non-ASCII bytes from
//! the device never abort a session.

use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, trace};

use crate::inventory::Credential;

use super::{
    Endpoint, Session, Transport, TransportError, TransportResult, PASSWORD_PROMPT,
    USERNAME_PROMPT, USER_PROMPT,
};

const READ_CHUNK: usize = 4096;

/// Production transport over plain TCP.
#[derive(Debug, Default)]
pub struct TelnetTransport;

impl TelnetTransport {
    /// Creates the transport.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for TelnetTransport {
    async fn open(
        &self,
        endpoint: &Endpoint,
        credential: &Credential,
        login_timeout: Duration,
    ) -> TransportResult<Box<dyn Session>> {
        let deadline = Instant::now() + login_timeout;
        debug!(device = %endpoint.name, addr = %endpoint.addr, "opening management session");

        let stream = timeout_at(deadline, TcpStream::connect(endpoint.addr))
            .await
            .map_err(|_| TransportError::ConnectFailed(format!("connect to {} timed out", endpoint.addr)))?
            .map_err(|e| TransportError::ConnectFailed(format!("{}: {}", endpoint.addr, e)))?;

        let mut session = TelnetSession {
            device: endpoint.name.clone(),
            stream: Some(stream),
            buffer: Vec::new(),
        };

        if let Err(err) = login(&mut session, credential, deadline).await {
            let _ = session.close().await;
            return Err(err);
        }
        debug!(device = %endpoint.name, "login complete");
        Ok(Box::new(session))
    }
}

/// Drives the three-step login exchange. Timeouts here are reported as
/// `LoginFailed` so the caller can distinguish a bad login from a mid-session
/// read timeout.
async fn login(
    session: &mut TelnetSession,
    credential: &Credential,
    deadline: Instant,
) -> TransportResult<()> {
    session
        .expect_until(&USERNAME_PROMPT, deadline)
        .await
        .map_err(|e| login_failure("username prompt not seen", e))?;
    session.send_line(&credential.username).await?;

    session
        .expect_until(&PASSWORD_PROMPT, deadline)
        .await
        .map_err(|e| login_failure("password prompt not seen", e))?;
    session.send_secret(&credential.secret).await?;

    session
        .expect_until(&USER_PROMPT, deadline)
        .await
        .map_err(|e| login_failure("command prompt not seen after credentials", e))?;
    Ok(())
}

fn login_failure(context: &str, err: TransportError) -> TransportError {
    match err {
        TransportError::Timeout { .. } => TransportError::LoginFailed(context.to_string()),
        TransportError::Closed => {
            TransportError::LoginFailed(format!("{} (connection closed)", context))
        }
        other => other,
    }
}

struct TelnetSession {
    device: String,
    stream: Option<TcpStream>,
    buffer: Vec<u8>,
}

impl TelnetSession {
    /// Reads until the pattern matches or the absolute deadline passes.
    async fn expect_until(&mut self, pattern: &Regex, deadline: Instant) -> TransportResult<String> {
        loop {
            let decoded = String::from_utf8_lossy(&self.buffer);
            if let Some(m) = pattern.find(&decoded) {
                let end = m.end();
                // Take the matched region out of the buffer; the raw drain
                // length is re-derived because replacement chars in the
                // decoding can stand for one to three wire bytes.
                let consumed = decoded[..end].to_string();
                let byte_end = consumed_byte_len(&self.buffer, end);
                self.buffer.drain(..byte_end);
                trace!(device = %self.device, bytes = byte_end, "prompt matched");
                return Ok(consumed);
            }

            let stream = self.stream.as_mut().ok_or(TransportError::Closed)?;
            let mut chunk = [0u8; READ_CHUNK];
            let now = Instant::now();
            if now >= deadline {
                return Err(TransportError::Timeout {
                    timeout: Duration::ZERO,
                });
            }
            let read = timeout_at(deadline, stream.read(&mut chunk))
                .await
                .map_err(|_| TransportError::Timeout {
                    timeout: deadline.saturating_duration_since(now),
                })??;
            if read == 0 {
                return Err(TransportError::Closed);
            }
            self.buffer.extend_from_slice(&chunk[..read]);
        }
    }

    async fn write_line(&mut self, line: &str) -> TransportResult<()> {
        let stream = self.stream.as_mut().ok_or(TransportError::Closed)?;
        stream.write_all(line.as_bytes()).await?;
        stream.write_all(b"\r\n").await?;
        stream.flush().await?;
        Ok(())
    }
}

/// Number of raw bytes corresponding to the first `decoded_end` bytes of the
/// lossy decoding. Walks the raw buffer with the same maximal-subpart rule
/// `from_utf8_lossy` applies, so one replacement character (3 decoded bytes)
/// can account for one, two, or three undecodable wire bytes.
fn consumed_byte_len(raw: &[u8], decoded_end: usize) -> usize {
    let mut raw_idx = 0usize;
    let mut dec_idx = 0usize;
    while dec_idx < decoded_end && raw_idx < raw.len() {
        let rest = &raw[raw_idx..];
        let (valid, invalid_len) = match std::str::from_utf8(rest) {
            Ok(valid) => (valid, 0),
            Err(err) => {
                // The prefix up to valid_up_to is well-formed, so the
                // re-slice cannot fail. error_len of None means the buffer
                // ends mid-sequence; the whole tail is the invalid run.
                let valid = std::str::from_utf8(&rest[..err.valid_up_to()]).unwrap_or_default();
                let invalid = err
                    .error_len()
                    .unwrap_or(rest.len() - err.valid_up_to());
                (valid, invalid)
            }
        };
        for ch in valid.chars() {
            if dec_idx >= decoded_end {
                return raw_idx;
            }
            dec_idx += ch.len_utf8();
            raw_idx += ch.len_utf8();
        }
        if dec_idx < decoded_end && invalid_len > 0 {
            dec_idx += char::REPLACEMENT_CHARACTER.len_utf8();
            raw_idx += invalid_len;
        }
    }
    raw_idx.min(raw.len())
}

#[async_trait]
impl Session for TelnetSession {
    async fn expect(&mut self, pattern: &Regex, timeout: Duration) -> TransportResult<String> {
        self.expect_until(pattern, Instant::now() + timeout).await
    }

    async fn send_line(&mut self, line: &str) -> TransportResult<()> {
        trace!(device = %self.device, %line, "send");
        self.write_line(line).await
    }

    async fn send_secret(&mut self, secret: &SecretString) -> TransportResult<()> {
        trace!(device = %self.device, line = "****", "send");
        let line = secret.expose_secret().to_string();
        self.write_line(&line).await
    }

    async fn close(&mut self) -> TransportResult<()> {
        if let Some(mut stream) = self.stream.take() {
            debug!(device = %self.device, "closing session");
            let _ = stream.shutdown().await;
        }
        Ok(())
    }
}
