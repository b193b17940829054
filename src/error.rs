//! Error types for fleetconf.
//!
//! The engine surfaces a single error taxonomy to callers: every terminal
//! failure carries one of these kinds plus a human-readable message. Layer
//! errors (transport, repository, driver) are defined next to the layer that
//! produces them and converted here at the engine boundary.

use thiserror::Error;

use crate::inventory::RepositoryError;
use crate::transport::TransportError;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// The error taxonomy surfaced by the configuration engine.
///
/// The boundary between "warning, keep going" and "terminal" for
/// [`EngineError::DeviceRejected`] is declared by the dialect per command;
/// the engine only ever returns the terminal form.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The intent was rejected by the dialect validator before any I/O.
    #[error("Invalid parameters for {intent}: {message}")]
    Parameter {
        /// Intent family name
        intent: &'static str,
        /// What was wrong with the parameters
        message: String,
    },

    /// No inventory entry for the requested device.
    #[error("Device '{0}' is not in the inventory")]
    DeviceUnknown(String),

    /// The inventory backend is down; the caller may retry.
    #[error("Inventory backend unavailable: {0}")]
    BackendUnavailable(String),

    /// TCP open/close failure on the management session.
    #[error("Transport error for '{host}': {source}")]
    Transport {
        /// Target device name or address
        host: String,
        /// Underlying transport failure
        #[source]
        source: TransportError,
    },

    /// The login prompt sequence was not seen or the credentials were rejected.
    #[error("Login failed for '{host}': {message}")]
    LoginFailed {
        /// Target device name or address
        host: String,
        /// What went wrong (never contains the secret)
        message: String,
    },

    /// A read deadline was exceeded.
    #[error("Timed out during {phase} after {timeout_secs} seconds")]
    Timeout {
        /// Which phase timed out (login, command, lease, intent)
        phase: &'static str,
        /// The deadline that was exceeded, in seconds
        timeout_secs: u64,
    },

    /// The device returned an error marker on a critical command.
    #[error("Device rejected command '{command}': {detail}")]
    DeviceRejected {
        /// The command that was rejected
        command: String,
        /// Last line(s) of device output explaining the rejection
        detail: String,
    },

    /// The driver saw a prompt, but not the one the command targeted, and
    /// walking back with `quit` did not restore a known state.
    #[error("Dialogue desynchronized: expected {expected} prompt, saw {seen}")]
    ModeDesync {
        /// The prompt class the driver expected
        expected: &'static str,
        /// The prompt class that actually appeared
        seen: &'static str,
    },

    /// The caller cancelled the intent.
    #[error("Intent cancelled by caller")]
    Cancelled,

    /// The post-condition probe did not observe the expected state.
    #[error("Verification failed for {intent}: {message}")]
    VerificationFailed {
        /// Intent family name
        intent: &'static str,
        /// What the probe expected but did not find
        message: String,
    },

    /// The operation exists in the dialect surface but is contractually
    /// unsupported (per-interface STP tuning).
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Internal invariant violation.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Creates a parameter error for the named intent family.
    pub fn parameter(intent: &'static str, message: impl Into<String>) -> Self {
        Self::Parameter {
            intent,
            message: message.into(),
        }
    }

    /// Creates a verification failure for the named intent family.
    pub fn verification(intent: &'static str, message: impl Into<String>) -> Self {
        Self::VerificationFailed {
            intent,
            message: message.into(),
        }
    }

    /// Short machine-readable reason tag used in terminal failure events.
    pub fn reason(&self) -> &'static str {
        match self {
            EngineError::Parameter { .. } => "parameter",
            EngineError::DeviceUnknown(_) => "device_unknown",
            EngineError::BackendUnavailable(_) => "backend_unavailable",
            EngineError::Transport { .. } => "transport",
            EngineError::LoginFailed { .. } => "login_failed",
            EngineError::Timeout { .. } => "timeout",
            EngineError::DeviceRejected { .. } => "device_rejected",
            EngineError::ModeDesync { .. } => "mode_desync",
            EngineError::Cancelled => "cancelled",
            EngineError::VerificationFailed { .. } => "verification_failed",
            EngineError::Unsupported(_) => "unsupported",
            EngineError::Internal(_) => "internal",
        }
    }

    /// Returns true if the caller may reasonably retry the same intent.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EngineError::BackendUnavailable(_) | EngineError::Timeout { .. }
        )
    }
}

impl From<RepositoryError> for EngineError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(name) => EngineError::DeviceUnknown(name),
            RepositoryError::Unavailable(msg) => EngineError::BackendUnavailable(msg),
        }
    }
}
