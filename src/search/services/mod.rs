//! Application services for the search pipeline.

mod pipeline;
mod retry;


pub use pipeline::{DEFAULT_PER_SERVICE_CAP, PipelineError, PipelineSettings, SearchFetchPipeline};
pub use retry::{RetryFailure, RetryPolicy};
