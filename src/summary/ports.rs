//! Collaborators around the search pipeline: planning and summarising.

use crate::search::domain::{PipelineOutput, SearchPlan};
use async_trait::async_trait;
use thiserror::Error;

/// Errors reported by a [`Summarizer`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SummarizerError {
    /// The summarizer could not produce text.
    #[error("summarizer failed: {0}")]
    Failed(String),
}

/// Errors reported by a [`QueryPlanner`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlannerError {
    /// The planner could not produce a plan.
    #[error("query planner failed: {0}")]
    Failed(String),
}

/// Turns a question and its retrieved documents into prose.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Summarises `output` as an answer to `question`.
    async fn summarize(
        &self,
        question: &str,
        output: &PipelineOutput,
    ) -> Result<String, SummarizerError>;
}

/// Turns a natural-language question into per-service search parameters.
#[async_trait]
pub trait QueryPlanner: Send + Sync {
    /// Plans the searches for `question`.
    async fn plan(&self, question: &str) -> Result<SearchPlan, PlannerError>;
}
