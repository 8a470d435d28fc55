//! Summary stage: evidence links and a fail-soft summarizer wrapper.
//!
//! The summarizer and the query planner are collaborators behind ports;
//! this crate ships no implementation of either.

mod evidence;
mod ports;
mod service;

pub use evidence::{EvidenceLink, EvidenceLinks, format_evidence_links};
pub use ports::{PlannerError, QueryPlanner, Summarizer, SummarizerError};
pub use service::{DEFAULT_SUMMARY_TIMEOUT, Summary, SummaryService, fallback_markdown};
