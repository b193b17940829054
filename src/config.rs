//! Configuration for the engine and prober.
//!
//! All knobs are plain fields with the documented defaults; `from_env` merges
//! overrides from `FLEETCONF_*` environment variables so deployments can tune
//! timeouts without a config file.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Engine-wide configuration constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Seconds between prober cycles.
    pub prober_interval_seconds: u64,

    /// Per-attempt ping timeout in seconds.
    pub prober_per_attempt_timeout_seconds: u64,

    /// Ping attempts per edge per cycle.
    pub prober_attempts: u32,

    /// Maximum concurrent probes within one cycle.
    pub prober_fanout: usize,

    /// Global ceiling on concurrent device sessions.
    pub global_session_ceiling: usize,

    /// Read deadline for a single command's output.
    pub per_command_read_timeout_seconds: u64,

    /// Read deadline covering the whole login exchange.
    pub per_login_read_timeout_seconds: u64,

    /// Overall deadline for one intent, submission to terminal event.
    pub intent_deadline_seconds: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            prober_interval_seconds: 30,
            prober_per_attempt_timeout_seconds: 2,
            prober_attempts: 3,
            prober_fanout: 8,
            global_session_ceiling: 16,
            per_command_read_timeout_seconds: 10,
            per_login_read_timeout_seconds: 15,
            intent_deadline_seconds: 60,
        }
    }
}

impl EngineConfig {
    /// Loads defaults, then applies any `FLEETCONF_*` environment overrides.
    ///
    /// Unparseable values are ignored with a warning rather than failing
    /// startup.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        merge_env("FLEETCONF_PROBER_INTERVAL_SECONDS", &mut config.prober_interval_seconds);
        merge_env(
            "FLEETCONF_PROBER_PER_ATTEMPT_TIMEOUT_SECONDS",
            &mut config.prober_per_attempt_timeout_seconds,
        );
        merge_env("FLEETCONF_PROBER_ATTEMPTS", &mut config.prober_attempts);
        merge_env("FLEETCONF_PROBER_FANOUT", &mut config.prober_fanout);
        merge_env("FLEETCONF_GLOBAL_SESSION_CEILING", &mut config.global_session_ceiling);
        merge_env(
            "FLEETCONF_PER_COMMAND_READ_TIMEOUT_SECONDS",
            &mut config.per_command_read_timeout_seconds,
        );
        merge_env(
            "FLEETCONF_PER_LOGIN_READ_TIMEOUT_SECONDS",
            &mut config.per_login_read_timeout_seconds,
        );
        merge_env("FLEETCONF_INTENT_DEADLINE_SECONDS", &mut config.intent_deadline_seconds);
        config
    }

    /// Prober cycle period.
    pub fn prober_interval(&self) -> Duration {
        Duration::from_secs(self.prober_interval_seconds)
    }

    /// Per-attempt ping timeout.
    pub fn prober_attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.prober_per_attempt_timeout_seconds)
    }

    /// Per-command read deadline.
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.per_command_read_timeout_seconds)
    }

    /// Login exchange deadline.
    pub fn login_timeout(&self) -> Duration {
        Duration::from_secs(self.per_login_read_timeout_seconds)
    }

    /// Whole-intent deadline.
    pub fn intent_deadline(&self) -> Duration {
        Duration::from_secs(self.intent_deadline_seconds)
    }
}

fn merge_env<T: std::str::FromStr>(key: &str, slot: &mut T) {
    if let Ok(raw) = std::env::var(key) {
        match raw.parse() {
            Ok(value) => *slot = value,
            Err(_) => tracing::warn!(%key, %raw, "ignoring unparseable configuration override"),
        }
    }
}
