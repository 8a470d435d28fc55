//! Adapters for the search pipeline.
//!
//! The adapter table maps each service to its search tool, argument names
//! and payload parser. Sessions come from supervised RPC clients or, in
//! tests, from an in-memory directory.

mod drive;
mod github;
mod memory;
mod session;
mod slack;
mod table;

pub use drive::DriveAdapter;
pub use github::GithubAdapter;
pub use memory::InMemorySessionDirectory;
pub use slack::SlackAdapter;
pub use table::{
    MAX_RESULTS_KEY, ParsedSearch, QUERY_KEY, SearchRequest, ServiceAdapter, adapter_for,
};
