//! Domain model for the search-then-fetch pipeline.
//!
//! Search hits are service-qualified records produced by adapters; fetch
//! results carry full content or, after a failed fetch, the search snippet.
//! Every skip or degradation becomes a typed warning on the output.

mod error;
mod output;
mod plan;
mod result;

pub use error::{AdapterError, AdapterParseError, ParseResultKindError};
pub use output::{PipelineOutput, PipelineWarning};
pub use plan::{SearchPlan, ServiceQuery};
pub use result::{
    FetchResult, FetchTarget, ResultKind, SNIPPET_MAX_CHARS, SearchResult, snippet_of,
};
