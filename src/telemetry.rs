//! Tracing subscriber set-up.
//!
//! Logs go to stderr; stdout carries protocol frames in the mock backend.

use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Directive used when `RUST_LOG` is unset.
pub const DEFAULT_DIRECTIVE: &str = "workspace_finder=info,warn";

/// Errors raised while installing the subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TelemetryError {
    /// The fallback filter directive does not parse.
    #[error("invalid log directive '{directive}': {reason}")]
    InvalidDirective {
        /// Offending directive.
        directive: String,
        /// Parser message.
        reason: String,
    },

    /// A global subscriber is already installed.
    #[error("a global tracing subscriber is already installed")]
    AlreadyInstalled,
}

/// Builds the filter from `RUST_LOG`, falling back to `default_directive`.
///
/// # Errors
///
/// Returns [`TelemetryError::InvalidDirective`] when `RUST_LOG` is unset or
/// invalid and `default_directive` does not parse either.
pub fn env_filter(default_directive: &str) -> Result<EnvFilter, TelemetryError> {
    EnvFilter::try_from_default_env().or_else(|_| {
        EnvFilter::try_new(default_directive).map_err(|err| TelemetryError::InvalidDirective {
            directive: default_directive.to_owned(),
            reason: err.to_string(),
        })
    })
}

/// Installs a stderr `fmt` subscriber filtered by `RUST_LOG`.
///
/// # Errors
///
/// Returns [`TelemetryError`] when the filter is invalid or a subscriber is
/// already installed.
pub fn init_tracing(default_directive: &str) -> Result<(), TelemetryError> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(default_directive)?)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init()
        .map_err(|_| TelemetryError::AlreadyInstalled)
}
