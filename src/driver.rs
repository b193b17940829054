//! Dialogue driver: mode tracking and prompt-bounded command execution.
//!
//! The driver owns the only two pieces of dialogue state that matter: the
//! current [`Mode`] and the prompt set. For each command it derives the
//! expected prompt from the command's *target* mode, reads exactly until that
//! prompt (or the per-command deadline), and classifies what actually
//! appeared. Semantic interpretation of output belongs to the dialect; the
//! driver only detects device error markers and prompt mismatches.

use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::dialect::{Command, Mode};
use crate::error::EngineError;
use crate::transport::{Session, TransportError, USER_PROMPT};

/// System-view and sub-context prompt, e.g. `[R1]` or `[R1-ip-pool-p1]`.
pub static CONFIG_PROMPT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[[^\[\]\r\n]+\]\s*$").unwrap());

/// Save/overwrite confirmation prompt.
pub static CONFIRM_PROMPT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[Y/N\]:\s*$").unwrap());

/// Alternation of every prompt the driver understands; classification happens
/// after the match.
static ANY_PROMPT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:<[^<>\r\n]+>\s*$)|(?:\[Y/N\]:\s*$)|(?:\[[^\[\]\r\n]+\]\s*$)").unwrap()
});

/// How many `quit`s the walk-back sends before giving up.
const WALK_BACK_DEPTH: usize = 4;

/// Which prompt family appeared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PromptClass {
    User,
    Config,
    Confirm,
}

impl PromptClass {
    fn name(self) -> &'static str {
        match self {
            PromptClass::User => "user",
            PromptClass::Config => "config",
            PromptClass::Confirm => "confirm",
        }
    }

    fn of_mode(mode: &Mode) -> Self {
        match mode {
            Mode::User => PromptClass::User,
            Mode::System | Mode::Sub(_) => PromptClass::Config,
        }
    }

    fn classify(tail: &str) -> Option<Self> {
        if CONFIRM_PROMPT.is_match(tail) {
            Some(PromptClass::Confirm)
        } else if USER_PROMPT.is_match(tail) {
            Some(PromptClass::User)
        } else if CONFIG_PROMPT.is_match(tail) {
            Some(PromptClass::Config)
        } else {
            None
        }
    }
}

/// Errors at the dialogue layer.
#[derive(Error, Debug)]
pub enum DriverError {
    /// The expected prompt was not seen before the per-command deadline.
    #[error("Prompt not seen within {:.1}s", timeout.as_secs_f64())]
    Timeout {
        /// The deadline that was exceeded
        timeout: Duration,
    },

    /// The output contained a device error marker. The prompt still
    /// returned, so the dialogue remains usable; policy is the engine's call.
    #[error("Device rejected '{command}'")]
    Rejected {
        /// The rejected command
        command: String,
        /// Verbatim output for the command
        output: String,
    },

    /// A prompt appeared, but not the one the command targeted, and the
    /// walk-back could not restore a known state.
    #[error("Mode desync: expected {expected} prompt, saw {seen}")]
    Desync {
        /// The prompt class that was expected
        expected: &'static str,
        /// The class that appeared
        seen: &'static str,
    },

    /// Transport failure underneath the dialogue.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl DriverError {
    /// Converts into the engine taxonomy, attaching the device name where
    /// the engine variant carries one.
    pub fn into_engine(self, host: &str) -> EngineError {
        match self {
            DriverError::Timeout { timeout } => EngineError::Timeout {
                phase: "command",
                timeout_secs: timeout.as_secs(),
            },
            DriverError::Rejected { command, output } => EngineError::DeviceRejected {
                command,
                detail: output.trim().to_string(),
            },
            DriverError::Desync { expected, seen } => EngineError::ModeDesync { expected, seen },
            DriverError::Transport(source) => EngineError::Transport {
                host: host.to_string(),
                source,
            },
        }
    }
}

/// Result of one executed command.
#[derive(Debug)]
pub struct CommandOutcome {
    /// Verbatim output captured between issue and prompt, echo included.
    pub output: String,
    /// True if a `[Y/N]:` confirmation appeared and was answered `Y`.
    pub confirmed: bool,
}

/// The running state of one device dialogue.
pub struct DialogueDriver {
    session: Box<dyn Session>,
    device: String,
    mode: Mode,
    markers: Vec<&'static str>,
    command_timeout: Duration,
    command_log: Vec<String>,
    last_prompt: Option<String>,
}

impl DialogueDriver {
    /// Wraps a logged-in session sitting at the top-level prompt.
    pub fn new(
        session: Box<dyn Session>,
        device: impl Into<String>,
        markers: &[&'static str],
        command_timeout: Duration,
    ) -> Self {
        Self {
            session,
            device: device.into(),
            mode: Mode::User,
            markers: markers.to_vec(),
            command_timeout,
            command_log: Vec::new(),
            last_prompt: None,
        }
    }

    /// Current dialogue mode.
    pub fn mode(&self) -> &Mode {
        &self.mode
    }

    /// The device name the dialogue was opened for.
    pub fn device_name(&self) -> &str {
        &self.device
    }

    /// Every command line issued so far, confirmations included.
    pub fn command_log(&self) -> &[String] {
        &self.command_log
    }

    /// Issues one command and reads until the prompt implied by its target
    /// mode. A confirmation prompt is acknowledged with `Y` when the command
    /// allows it; an unexpected prompt triggers the walk-back.
    pub async fn run(&mut self, command: &Command) -> Result<CommandOutcome, DriverError> {
        trace!(device = %self.device, command = %command.text, target = %command.target, "issue");
        self.session.send_line(&command.text).await?;
        self.command_log.push(command.text.clone());

        let mut output = self
            .session
            .expect(&ANY_PROMPT, self.command_timeout)
            .await
            .map_err(map_expect_err)?;
        let mut seen = self.classify_tail(&output)?;
        let mut confirmed = false;

        if seen == PromptClass::Confirm {
            if !command.may_confirm {
                return Err(self.desync(command, seen).await);
            }
            debug!(device = %self.device, command = %command.text, "confirmation prompt, answering Y");
            self.session.send_line("Y").await?;
            self.command_log.push("Y".to_string());
            confirmed = true;
            let more = self
                .session
                .expect(&ANY_PROMPT, self.command_timeout)
                .await
                .map_err(map_expect_err)?;
            seen = self.classify_tail(&more)?;
            output.push_str(&more);
        }

        let expected = PromptClass::of_mode(&command.target);
        if seen != expected {
            return Err(self.desync(command, seen).await);
        }

        self.mode = command.target.clone();
        self.last_prompt = output.lines().last().map(str::to_string);

        if let Some(marker) = self.find_marker(&output) {
            debug!(device = %self.device, command = %command.text, %marker, "device error marker");
            return Err(DriverError::Rejected {
                command: command.text.clone(),
                output,
            });
        }

        Ok(CommandOutcome { output, confirmed })
    }

    /// Convenience for read-only probes: runs and returns just the output.
    pub async fn probe(&mut self, text: &str, target: Mode) -> Result<String, DriverError> {
        let outcome = self.run(&Command::new(text, target)).await?;
        Ok(outcome.output)
    }

    /// Walks the dialogue back toward user view with `quit`, bounded in
    /// depth, then reports the desync. The dialogue either ends at a known
    /// state or the session is abandoned by the engine.
    async fn desync(&mut self, command: &Command, seen: PromptClass) -> DriverError {
        let expected = PromptClass::of_mode(&command.target);
        warn!(
            device = %self.device,
            command = %command.text,
            expected = expected.name(),
            seen = seen.name(),
            "prompt mismatch, walking back"
        );
        for _ in 0..WALK_BACK_DEPTH {
            if self.session.send_line("quit").await.is_err() {
                break;
            }
            self.command_log.push("quit".to_string());
            match self.session.expect(&ANY_PROMPT, self.command_timeout).await {
                Ok(chunk) => {
                    if PromptClass::classify(chunk.trim_end_matches(['\r', '\n']))
                        == Some(PromptClass::User)
                    {
                        self.mode = Mode::User;
                        break;
                    }
                }
                Err(_) => break,
            }
        }
        DriverError::Desync {
            expected: expected.name(),
            seen: seen.name(),
        }
    }

    fn classify_tail(&self, output: &str) -> Result<PromptClass, DriverError> {
        let tail = output.trim_end_matches(['\r', '\n']);
        PromptClass::classify(tail).ok_or(DriverError::Desync {
            expected: "known",
            seen: "none",
        })
    }

    fn find_marker(&self, output: &str) -> Option<&'static str> {
        self.markers.iter().copied().find(|m| output.contains(m))
    }

    /// Closes the underlying session. Idempotent.
    pub async fn close(&mut self) {
        if let Err(e) = self.session.close().await {
            debug!(device = %self.device, error = %e, "close after session end");
        }
    }
}

fn map_expect_err(err: TransportError) -> DriverError {
    match err {
        TransportError::Timeout { timeout } => DriverError::Timeout { timeout },
        other => DriverError::Transport(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_classification() {
        assert_eq!(PromptClass::classify("<R1>"), Some(PromptClass::User));
        assert_eq!(PromptClass::classify("[R1]"), Some(PromptClass::Config));
        assert_eq!(
            PromptClass::classify("[R1-ip-pool-p1]"),
            Some(PromptClass::Config)
        );
        assert_eq!(
            PromptClass::classify("Save? [Y/N]:"),
            Some(PromptClass::Confirm)
        );
        assert_eq!(PromptClass::classify("no prompt here"), None);
    }

    #[test]
    fn mode_maps_to_prompt_class() {
        assert_eq!(PromptClass::of_mode(&Mode::User), PromptClass::User);
        assert_eq!(PromptClass::of_mode(&Mode::System), PromptClass::Config);
        assert_eq!(
            PromptClass::of_mode(&Mode::sub("ip-pool-p1")),
            PromptClass::Config
        );
    }

    #[test]
    fn any_prompt_matches_each_family() {
        assert!(ANY_PROMPT.is_match("output\r\n<R1>"));
        assert!(ANY_PROMPT.is_match("output\r\n[R1-acl-basic-2000]"));
        assert!(ANY_PROMPT.is_match("Warning: continue? [Y/N]:"));
    }
}
