//! Domain model for supervised backend processes.
//!
//! The lifecycle state machine, the runtime process record with its
//! transition history, and crash classification. Process handles and I/O
//! stay in the adapters.

mod crash;
mod error;
mod process;
mod state;

pub use crash::{AUTH_EXIT_CODE, CrashClassifier, CrashVerdict, ProcessExit};
pub use error::{ParseProcessStateError, SupervisorDomainError};
pub use process::{ProcessSnapshot, RuntimeProcess, StateTransition};
pub use state::ProcessState;
