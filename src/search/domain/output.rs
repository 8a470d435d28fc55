//! Pipeline warnings and output.

use super::FetchResult;
use crate::service::domain::ServiceKind;
use crate::supervisor::domain::ProcessState;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A non-fatal event recorded during a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum PipelineWarning {
    /// The service had no running backend and was not searched.
    ServiceSkipped {
        /// Skipped service.
        service: ServiceKind,
        /// Backend state at the time, if supervised.
        state: Option<ProcessState>,
    },
    /// The service throttled its search; it was not retried.
    SearchRateLimited {
        /// Throttled service.
        service: ServiceKind,
    },
    /// The search call failed after retries.
    SearchFailed {
        /// Failing service.
        service: ServiceKind,
        /// Last observed error.
        reason: String,
    },
    /// Part or all of a search response could not be parsed.
    ResultSkipped {
        /// Affected service.
        service: ServiceKind,
        /// Parse failure.
        reason: String,
    },
    /// A fetch failed; the result fell back to its snippet.
    FetchDegraded {
        /// Owning service.
        service: ServiceKind,
        /// Result identifier.
        uri: String,
        /// Why the fetch failed.
        reason: String,
    },
}

impl PipelineWarning {
    /// Returns the service the warning concerns.
    #[must_use]
    pub const fn service(&self) -> ServiceKind {
        match self {
            Self::ServiceSkipped { service, .. }
            | Self::SearchRateLimited { service }
            | Self::SearchFailed { service, .. }
            | Self::ResultSkipped { service, .. }
            | Self::FetchDegraded { service, .. } => *service,
        }
    }
}

impl fmt::Display for PipelineWarning {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ServiceSkipped {
                service,
                state: Some(state),
            } => write!(formatter, "{service}: skipped, backend is {state}"),
            Self::ServiceSkipped {
                service,
                state: None,
            } => write!(formatter, "{service}: skipped, backend is not launched"),
            Self::SearchRateLimited { service } => {
                write!(formatter, "{service}: rate limited, search not retried")
            }
            Self::SearchFailed { service, reason } => {
                write!(formatter, "{service}: search failed: {reason}")
            }
            Self::ResultSkipped { service, reason } => {
                write!(formatter, "{service}: skipped unparseable results: {reason}")
            }
            Self::FetchDegraded {
                service,
                uri,
                reason,
            } => write!(
                formatter,
                "{service}: using snippet for {uri}, fetch failed: {reason}"
            ),
        }
    }
}

/// Everything a pipeline run produced, ready for summarisation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineOutput {
    /// Documents grouped by service, each in backend order.
    pub documents: Vec<FetchResult>,
    /// Every skip, failure and degradation, grouped by service in plan order.
    pub warnings: Vec<PipelineWarning>,
    /// Alternative queries, present only when no document was found.
    pub alternatives: Vec<String>,
}

impl PipelineOutput {
    /// Returns the documents of one service.
    pub fn documents_for(&self, service: ServiceKind) -> impl Iterator<Item = &FetchResult> {
        self.documents
            .iter()
            .filter(move |document| document.service == service)
    }

    /// Returns the warnings about one service.
    pub fn warnings_for(&self, service: ServiceKind) -> impl Iterator<Item = &PipelineWarning> {
        self.warnings
            .iter()
            .filter(move |warning| warning.service() == service)
    }

    /// Returns whether nothing was found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}
