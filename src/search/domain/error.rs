//! Error types for search domain parsing.

use crate::service::domain::ServiceKind;
use thiserror::Error;

/// Maximum number of raw payload characters kept for diagnostics.
const RAW_PAYLOAD_LIMIT: usize = 2_000;

/// A search payload that did not have the shape its adapter expects.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("cannot parse {service} search payload: {reason}")]
pub struct AdapterParseError {
    /// Service whose payload failed to parse.
    pub service: ServiceKind,
    /// What was wrong.
    pub reason: String,
    /// The offending payload, truncated.
    pub raw: String,
}

impl AdapterParseError {
    /// Creates a parse error, keeping a bounded copy of `raw`.
    #[must_use]
    pub fn new(service: ServiceKind, reason: impl Into<String>, raw: &str) -> Self {
        Self {
            service,
            reason: reason.into(),
            raw: raw.chars().take(RAW_PAYLOAD_LIMIT).collect(),
        }
    }
}

/// Errors raised by service adapters.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AdapterError {
    /// The search payload could not be parsed.
    #[error(transparent)]
    Parse(#[from] AdapterParseError),

    /// The planned search parameters lack a usable query.
    #[error("invalid search parameters for {service}: {reason}")]
    InvalidSearchParams {
        /// Affected service.
        service: ServiceKind,
        /// What was wrong.
        reason: String,
    },
}

/// Error returned while parsing a result kind.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown result kind: {0}")]
pub struct ParseResultKindError(pub String);
