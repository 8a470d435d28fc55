//! Domain model for backend service definitions.
//!
//! A service definition says which backend runs, how its child process is
//! launched in each mode, and how readiness is detected. Process handling
//! lives in the supervisor.

mod definition;
mod error;
mod kind;
mod launch;
mod readiness;

pub use definition::ServiceDefinition;
pub use error::{
    ParseReadinessProbeError, ParseRunModeError, ParseServiceKindError, ServiceDomainError,
};
pub use kind::{RunMode, ServiceKind};
pub use launch::LaunchCommand;
pub use readiness::ReadinessProbe;
