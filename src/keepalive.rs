//! Keep-alive policy resolution.
//!
//! The server's idle lifetime comes from a single configuration value,
//! conventionally named `keepalive`, holding a non-negative number of
//! seconds. Zero disables persistence entirely: the server serves one
//! connection and exits. Anything unparseable degrades to the dispatcher's
//! default rather than failing startup.
//!
//! Resolution happens once, before the dispatcher takes over; this crate
//! never enforces the policy itself.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Environment variable holding the keep-alive setting.
pub const KEEPALIVE_ENV_VAR: &str = "BUILDSERVER_KEEPALIVE";

/// Configuration consumed at server startup.
///
/// Passed to the resolver as an explicit record so resolution stays pure
/// and testable; [`ServerConfig::from_env`] is the conventional process-wide
/// source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Raw `keepalive` setting, if present. Seconds as a decimal string.
    #[serde(default)]
    pub keepalive: Option<String>,
}

impl ServerConfig {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Self {
        Self {
            keepalive: std::env::var(KEEPALIVE_ENV_VAR).ok(),
        }
    }
}

/// How long the server stays alive with no active connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepAliveSetting {
    /// Fall back to the dispatcher's built-in idle duration.
    Default,
    /// One-shot: serve exactly one connection, then exit.
    Disabled,
    /// Stay alive for the given idle duration.
    Explicit(Duration),
}

impl KeepAliveSetting {
    /// Resolve the keep-alive policy from configuration.
    ///
    /// Total and idempotent: every input maps to exactly one setting, and
    /// malformed values degrade to [`KeepAliveSetting::Default`] with a
    /// warning instead of aborting startup.
    pub fn resolve(config: &ServerConfig) -> Self {
        let raw = match config.keepalive.as_deref() {
            Some(raw) => raw,
            None => return KeepAliveSetting::Default,
        };

        match raw.trim().parse::<u64>() {
            Ok(0) => KeepAliveSetting::Disabled,
            Ok(seconds) => KeepAliveSetting::Explicit(Duration::from_secs(seconds)),
            Err(e) => {
                tracing::warn!(value = raw, error = %e, "malformed keepalive setting, using default");
                KeepAliveSetting::Default
            }
        }
    }

    /// Whether this is the one-shot setting.
    pub fn is_one_shot(&self) -> bool {
        matches!(self, KeepAliveSetting::Disabled)
    }
}
