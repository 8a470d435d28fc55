//! Process-level adapters used by the supervisor.

mod child;
mod readiness;
mod stderr;

pub use child::{SpawnedChild, exit_of, terminate};
pub use readiness::{ReadinessError, await_readiness};
pub use stderr::{STDERR_TAIL_LINES, StderrTail};
