//! Supervisor service errors.

use crate::rpc::RpcError;
use crate::service::domain::ServiceKind;
use crate::supervisor::domain::SupervisorDomainError;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors returned by [`super::Supervisor`] operations.
#[derive(Debug, Clone, Error)]
pub enum SupervisorError {
    /// The child process could not be spawned.
    #[error("failed to spawn {service}: {source}")]
    Spawn {
        /// Affected service.
        service: ServiceKind,
        /// Spawn failure.
        source: Arc<std::io::Error>,
    },

    /// No readiness signal arrived in time.
    #[error("{service} did not become ready within {after:?}")]
    ReadinessTimeout {
        /// Affected service.
        service: ServiceKind,
        /// Elapsed timeout.
        after: Duration,
    },

    /// The process exited or broke its output before becoming ready.
    #[error("{service} failed before readiness: {reason}")]
    ReadinessFailure {
        /// Affected service.
        service: ServiceKind,
        /// Failure description.
        reason: String,
    },

    /// The `initialize` handshake failed.
    #[error("{service} handshake failed: {source}")]
    Handshake {
        /// Affected service.
        service: ServiceKind,
        /// Handshake failure.
        source: RpcError,
    },

    /// The service crashed beyond recovery.
    #[error("{service} failed permanently: {reason}")]
    PermanentFailure {
        /// Affected service.
        service: ServiceKind,
        /// Classification reason.
        reason: String,
    },

    /// The service was never launched.
    #[error("{0} is not supervised")]
    UnknownService(ServiceKind),

    /// The service is already supervised and not in a terminal state.
    #[error("{0} is already launched")]
    AlreadyLaunched(ServiceKind),

    /// The supervisor is shutting down.
    #[error("supervisor is shutting down")]
    ShuttingDown,

    /// A lifecycle rule was violated.
    #[error(transparent)]
    Domain(#[from] SupervisorDomainError),
}

impl SupervisorError {
    /// Wraps a spawn failure.
    pub fn spawn(service: ServiceKind, err: std::io::Error) -> Self {
        Self::Spawn {
            service,
            source: Arc::new(err),
        }
    }
}

/// Result type for supervisor operations.
pub type SupervisorResult<T> = Result<T, SupervisorError>;
