//! Search-then-fetch over the supervised backends.
//!
//! A [`domain::SearchPlan`] names the services to query. The
//! [`services::SearchFetchPipeline`] searches each running service through
//! its adapter, keeps the first hits in backend order, fetches their full
//! content and returns a [`domain::PipelineOutput`] with a warning for every
//! skip or degradation.

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;
