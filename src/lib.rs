//! Workspace finder: answers questions from Slack, GitHub and Google Drive.
//!
//! Each workspace service is reached through a local MCP server speaking
//! newline-delimited JSON-RPC over stdio. The crate supervises those server
//! processes, fans a search plan out to every running service, fetches the
//! best hits and hands the evidence to an optional summarizer.
//!
//! # Architecture
//!
//! The crate follows hexagonal architecture principles:
//!
//! - **Domain**: plain data such as service definitions, process states and
//!   search results
//! - **Ports**: traits for backend sessions, summarizers and query planners
//! - **Adapters**: the stdio transport, spawned processes and per-service
//!   payload parsers
//!
//! # Modules
//!
//! - [`rpc`]: JSON-RPC framing, correlation and MCP calls
//! - [`service`]: service definitions and mode resolution
//! - [`supervisor`]: process launch, readiness, restarts and shutdown
//! - [`search`]: the search-then-fetch pipeline and service adapters
//! - [`summary`]: evidence links and the summary stage
//! - [`finder`]: one-shot orchestration of all of the above
//! - [`config`] and [`telemetry`]: configuration file and tracing setup

pub mod config;
pub mod finder;
pub mod rpc;
pub mod search;
pub mod service;
pub mod summary;
pub mod supervisor;
pub mod telemetry;
