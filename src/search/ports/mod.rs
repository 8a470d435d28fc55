//! Port contracts for the search pipeline.

mod session;

pub use session::{BackendSession, SessionDirectory, SessionLookup};
