//! Two-phase search-then-fetch pipeline.
//!
//! The search phase queries every planned service concurrently and waits for
//! all of them to settle. Each service's hits are parsed by its adapter and
//! capped, keeping the backend's order. The fetch phase then retrieves every
//! surviving hit concurrently. Failures stay local: a service that cannot be
//! searched contributes a warning, and a hit that cannot be fetched falls
//! back to its snippet.
//!
//! Sessions are looked up again for every attempt, so a backend restarted by
//! its supervisor between attempts is reached through its new transport.

use super::RetryPolicy;
use super::retry::RetryFailure;
use crate::rpc::{RpcError, RpcResult};
use crate::search::adapters::adapter_for;
use crate::search::domain::{
    FetchResult, FetchTarget, PipelineOutput, PipelineWarning, SearchPlan, SearchResult,
};
use crate::search::ports::{BackendSession, SessionDirectory, SessionLookup};
use crate::service::domain::ServiceKind;
use futures_util::future::join_all;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default number of hits fetched per service.
pub const DEFAULT_PER_SERVICE_CAP: usize = 3;

/// Pipeline tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSettings {
    /// Hits kept per service, in backend order.
    pub per_service_cap: usize,
    /// Policy wrapped around every search and fetch call.
    pub retry: RetryPolicy,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            per_service_cap: DEFAULT_PER_SERVICE_CAP,
            retry: RetryPolicy::default(),
        }
    }
}

/// Errors that end a pipeline run without output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PipelineError {
    /// The caller cancelled the run.
    #[error("pipeline run cancelled")]
    Cancelled,
}

/// Services that throttled a call during the current run.
#[derive(Debug, Default)]
struct RateLimits(Mutex<BTreeSet<ServiceKind>>);

impl RateLimits {
    fn mark(&self, service: ServiceKind) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(service);
    }

    fn contains(&self, service: ServiceKind) -> bool {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&service)
    }
}

/// What the search phase produced for one service.
struct ServiceHits {
    results: Vec<SearchResult>,
    warnings: Vec<PipelineWarning>,
}

impl ServiceHits {
    fn skipped(warning: PipelineWarning) -> Self {
        Self {
            results: Vec::new(),
            warnings: vec![warning],
        }
    }
}

/// Runs search plans against the services of a [`SessionDirectory`].
#[derive(Debug, Clone, Default)]
pub struct SearchFetchPipeline {
    settings: PipelineSettings,
}

impl SearchFetchPipeline {
    /// Creates a pipeline.
    #[must_use]
    pub const fn new(settings: PipelineSettings) -> Self {
        Self { settings }
    }

    /// Returns the pipeline settings.
    #[must_use]
    pub const fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Runs `plan`, or stops as soon as `cancel` fires.
    ///
    /// In-flight calls are abandoned on cancellation; their backends keep
    /// running and drop the late responses.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Cancelled`] when `cancel` fires first.
    pub async fn run_until_cancelled(
        &self,
        directory: &dyn SessionDirectory,
        plan: &SearchPlan,
        cancel: &CancellationToken,
    ) -> Result<PipelineOutput, PipelineError> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                info!("pipeline run cancelled");
                Err(PipelineError::Cancelled)
            }
            output = self.run(directory, plan) => Ok(output),
        }
    }

    /// Runs `plan` to completion.
    ///
    /// Never fails: every skipped service, unparseable payload and failed
    /// fetch is recorded as a warning on the output.
    pub async fn run(&self, directory: &dyn SessionDirectory, plan: &SearchPlan) -> PipelineOutput {
        let limits = RateLimits::default();

        let searches = plan.services().into_iter().map(|service| {
            let params = plan.params_for(service).cloned().unwrap_or(Value::Null);
            self.search_service(directory, service, params, &limits)
        });
        let hits = join_all(searches).await;

        let fetches = hits.iter().flat_map(|service_hits| {
            let ledger = &limits;
            service_hits
                .results
                .iter()
                .map(move |result| self.fetch_result(directory, result, ledger))
        });
        let mut fetched = join_all(fetches).await.into_iter();

        let mut output = PipelineOutput::default();
        for service_hits in &hits {
            output.warnings.extend(service_hits.warnings.iter().cloned());
            for (document, warning) in fetched.by_ref().take(service_hits.results.len()) {
                output.documents.push(document);
                output.warnings.extend(warning);
            }
        }
        if output.documents.is_empty() {
            output.alternatives.clone_from(&plan.alternatives);
        }

        info!(
            documents = output.documents.len(),
            warnings = output.warnings.len(),
            "pipeline run finished"
        );
        output
    }

    async fn search_service(
        &self,
        directory: &dyn SessionDirectory,
        service: ServiceKind,
        params: Value,
        limits: &RateLimits,
    ) -> ServiceHits {
        if let SessionLookup::Unavailable(state) = directory.session(service) {
            warn!(service = %service, ?state, "service not running; skipping search");
            return ServiceHits::skipped(PipelineWarning::ServiceSkipped { service, state });
        }

        let adapter = adapter_for(service);
        let cap = self.settings.per_service_cap;
        let request = match adapter.search_request(&params, cap) {
            Ok(request) => request,
            Err(err) => {
                warn!(service = %service, error = %err, "cannot build search request");
                return ServiceHits::skipped(PipelineWarning::SearchFailed {
                    service,
                    reason: err.to_string(),
                });
            }
        };

        debug!(service = %service, tool = request.tool, "searching");
        let tool = request.tool;
        let outcome = self
            .settings
            .retry
            .execute_gated(
                tool,
                || limits.contains(service),
                |_| {
                    let arguments = request.arguments.clone();
                    async move {
                        current_session(directory, service)?
                            .call_tool(tool, arguments)
                            .await
                    }
                },
            )
            .await;

        let payload = match outcome {
            Ok(payload) => payload,
            Err(failure) => {
                return ServiceHits::skipped(search_failure(service, &failure, limits));
            }
        };

        let mut warnings = Vec::new();
        let mut results = match adapter.parse_search(&payload) {
            Ok(parsed) => {
                warnings.extend(parsed.skipped.into_iter().map(|skip| {
                    debug!(service = %service, raw = %skip.raw, "skipping search entry");
                    PipelineWarning::ResultSkipped {
                        service,
                        reason: skip.reason,
                    }
                }));
                parsed.results
            }
            Err(err) => {
                warn!(service = %service, reason = %err.reason, raw = %err.raw, "unparseable search payload");
                warnings.push(PipelineWarning::ResultSkipped {
                    service,
                    reason: err.reason,
                });
                Vec::new()
            }
        };
        results.truncate(cap);
        debug!(service = %service, hits = results.len(), "search finished");

        ServiceHits {
            results,
            warnings,
        }
    }

    async fn fetch_result(
        &self,
        directory: &dyn SessionDirectory,
        result: &SearchResult,
        limits: &RateLimits,
    ) -> (FetchResult, Option<PipelineWarning>) {
        let service = result.service;
        let outcome = match &result.fetch {
            FetchTarget::Tool { name, params } => {
                self.settings
                    .retry
                    .execute_gated(
                        name,
                        || limits.contains(service),
                        |_| {
                            let arguments = params.clone();
                            async move {
                                current_session(directory, service)?
                                    .call_tool(name, arguments)
                                    .await
                            }
                        },
                    )
                    .await
            }
            FetchTarget::Resource { uri } => {
                self.settings
                    .retry
                    .execute_gated(
                        "resources/read",
                        || limits.contains(service),
                        |_| async move {
                            current_session(directory, service)?
                                .read_resource(uri)
                                .await
                        },
                    )
                    .await
            }
        };

        match outcome {
            Ok(content) => (FetchResult::fetched(result, content), None),
            Err(failure) => {
                if failure.is_rate_limited() {
                    limits.mark(service);
                }
                warn!(service = %service, uri = %result.uri, error = %failure, "fetch failed; using snippet");
                (
                    FetchResult::degraded(result),
                    Some(PipelineWarning::FetchDegraded {
                        service,
                        uri: result.uri.clone(),
                        reason: failure.to_string(),
                    }),
                )
            }
        }
    }
}

/// Looks up the session serving `service` for one attempt. A backend that
/// is not running fails the attempt as a closed transport, which retries.
fn current_session(
    directory: &dyn SessionDirectory,
    service: ServiceKind,
) -> RpcResult<Arc<dyn BackendSession>> {
    match directory.session(service) {
        SessionLookup::Ready(session) => Ok(session),
        SessionLookup::Unavailable(state) => {
            debug!(service = %service, ?state, "no live session for attempt");
            Err(RpcError::TransportClosed)
        }
    }
}

fn search_failure(service: ServiceKind, failure: &RetryFailure, limits: &RateLimits) -> PipelineWarning {
    if failure.is_rate_limited() {
        limits.mark(service);
        warn!(service = %service, error = %failure, "search rate limited");
        return PipelineWarning::SearchRateLimited { service };
    }
    warn!(service = %service, error = %failure, "search failed");
    PipelineWarning::SearchFailed {
        service,
        reason: failure.to_string(),
    }
}
