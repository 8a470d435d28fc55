//! Backend service definitions and their configuration.
//!
//! - Domain types in [`domain`]
//! - Configuration sections and mode resolution in [`config`]

pub mod config;
pub mod domain;
