//! Supervisor service orchestrating backend processes.

mod error;
mod settings;
mod slot;
mod supervisor;

pub use error::{SupervisorError, SupervisorResult};
pub use settings::SupervisorSettings;
pub use supervisor::Supervisor;
