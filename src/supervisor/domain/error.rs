//! Error types for supervisor domain rules.

use super::ProcessState;
use crate::service::domain::ServiceKind;
use thiserror::Error;

/// Errors returned by the runtime process aggregate.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SupervisorDomainError {
    /// The lifecycle does not allow the requested move.
    #[error("invalid lifecycle transition for {service}: {from} -> {to}")]
    InvalidTransition {
        /// Affected service.
        service: ServiceKind,
        /// Current state.
        from: ProcessState,
        /// Requested state.
        to: ProcessState,
    },
}

/// Error returned while parsing a process state name.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown process state: {0}")]
pub struct ParseProcessStateError(pub String);
