//! Error types for service definition validation and parsing.

use thiserror::Error;

/// Errors returned while constructing service definitions.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceDomainError {
    /// The launch command is empty.
    #[error("launch command must not be empty")]
    EmptyCommand,

    /// The working directory is empty after trimming.
    #[error("working directory must not be empty when provided")]
    EmptyWorkingDirectory,
}

/// Error returned while parsing a service name.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown service: {0}")]
pub struct ParseServiceKindError(pub String);

/// Error returned while parsing a run mode.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown run mode: {0}")]
pub struct ParseRunModeError(pub String);

/// Error returned while parsing a readiness probe.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown or incomplete readiness probe: {0}")]
pub struct ParseReadinessProbeError(pub String);
