//! Process supervision for backend child processes.
//!
//! Each backend runs as a child process speaking JSON-RPC over stdio. The
//! supervisor spawns it, waits for its readiness signal, performs the
//! protocol handshake, and monitors it for exits. Crashes are classified:
//! authentication failures and exhausted restart budgets are permanent,
//! everything else is restarted with exponential backoff.
//!
//! - Domain types in [`domain`]
//! - Process adapters in [`adapters`]
//! - The [`Supervisor`](services::Supervisor) in [`services`]

pub mod adapters;
pub mod domain;
pub mod services;
