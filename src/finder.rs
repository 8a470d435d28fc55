//! One-shot orchestration: launch, plan, search, summarise, shut down.

use crate::config::FinderConfig;
use crate::search::domain::{PipelineOutput, SearchPlan};
use crate::search::services::{PipelineError, SearchFetchPipeline};
use crate::service::domain::{ServiceDefinition, ServiceKind};
use crate::summary::{QueryPlanner, Summary, SummaryService};
use crate::supervisor::domain::ProcessState;
use crate::supervisor::services::Supervisor;
use futures_util::future::join_all;
use mockable::{Clock, DefaultClock};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Outcome of launching a set of services.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchReport {
    /// Services that reached `Running`.
    pub running: Vec<ServiceKind>,
    /// One line per service that failed to launch.
    pub warnings: Vec<String>,
}

/// Everything produced for one question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    /// The plan that was executed.
    pub plan: SearchPlan,
    /// Retrieved documents and pipeline warnings.
    pub output: PipelineOutput,
    /// Summary text and citations.
    pub summary: Summary,
    /// Planner notes followed by the summary warnings.
    pub warnings: Vec<String>,
}

/// Ties the supervisor, pipeline and summary stage together.
pub struct Finder<C = DefaultClock>
where
    C: Clock + Send + Sync + 'static,
{
    supervisor: Supervisor<C>,
    pipeline: SearchFetchPipeline,
    summary: SummaryService,
    planner: Option<Arc<dyn QueryPlanner>>,
}

impl<C> std::fmt::Debug for Finder<C>
where
    C: Clock + Send + Sync + 'static,
{
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Finder")
            .field("supervisor", &self.supervisor)
            .field("pipeline", &self.pipeline)
            .field("summary", &self.summary)
            .field("planner", &self.planner.is_some())
            .finish()
    }
}

impl Finder<DefaultClock> {
    /// Builds a finder from configuration, without summarizer or planner.
    #[must_use]
    pub fn from_config(config: &FinderConfig) -> Self {
        Self::new(
            Supervisor::new(config.supervisor.settings()),
            SearchFetchPipeline::new(config.pipeline.settings()),
            SummaryService::new(None).with_timeout(config.summary.timeout()),
        )
    }
}

impl<C> Finder<C>
where
    C: Clock + Send + Sync + 'static,
{
    /// Assembles a finder from its parts.
    #[must_use]
    pub const fn new(
        supervisor: Supervisor<C>,
        pipeline: SearchFetchPipeline,
        summary: SummaryService,
    ) -> Self {
        Self {
            supervisor,
            pipeline,
            summary,
            planner: None,
        }
    }

    /// Uses `planner` to turn questions into search plans.
    #[must_use]
    pub fn with_planner(mut self, planner: Arc<dyn QueryPlanner>) -> Self {
        self.planner = Some(planner);
        self
    }

    /// Replaces the summary stage.
    #[must_use]
    pub fn with_summary(mut self, summary: SummaryService) -> Self {
        self.summary = summary;
        self
    }

    /// Returns the supervisor.
    #[must_use]
    pub const fn supervisor(&self) -> &Supervisor<C> {
        &self.supervisor
    }

    /// Returns the state of every supervised service.
    #[must_use]
    pub fn status(&self) -> BTreeMap<ServiceKind, ProcessState> {
        self.supervisor.status()
    }

    /// Launches every definition concurrently.
    ///
    /// A service that fails to launch is reported, not fatal.
    pub async fn launch(
        &self,
        definitions: impl IntoIterator<Item = ServiceDefinition>,
    ) -> LaunchReport {
        let launches = definitions.into_iter().map(|definition| async move {
            let service = definition.service();
            (service, self.supervisor.launch(definition).await)
        });

        let mut report = LaunchReport::default();
        for (service, outcome) in join_all(launches).await {
            match outcome {
                Ok(_) => report.running.push(service),
                Err(err) => {
                    warn!(service = %service, error = %err, "launch failed");
                    report.warnings.push(format!("{service}: launch failed: {err}"));
                }
            }
        }
        info!(running = report.running.len(), failed = report.warnings.len(), "launch finished");
        report
    }

    /// Answers `question` from the running services.
    pub async fn ask(&self, question: &str) -> Answer {
        let (plan, mut warnings) = self.plan(question).await;
        let output = self.pipeline.run(&self.supervisor, &plan).await;
        let summary = self.summary.summarize(question, &output).await;
        warnings.extend(summary.warnings.iter().cloned());
        Answer {
            plan,
            output,
            summary,
            warnings,
        }
    }

    /// Like [`Self::ask`], but gives up when `cancel` fires.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Cancelled`] when `cancel` fires first.
    pub async fn ask_until_cancelled(
        &self,
        question: &str,
        cancel: &CancellationToken,
    ) -> Result<Answer, PipelineError> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(PipelineError::Cancelled),
            answer = self.ask(question) => Ok(answer),
        }
    }

    /// Stops every backend.
    pub async fn shutdown(&self) {
        self.supervisor.shutdown().await;
    }

    async fn plan(&self, question: &str) -> (SearchPlan, Vec<String>) {
        let Some(planner) = &self.planner else {
            return (self.uniform_plan(question), Vec::new());
        };
        let note = match planner.plan(question).await {
            Ok(plan) if !plan.queries.is_empty() => return (plan, Vec::new()),
            Ok(_) => "query planner returned no searches".to_owned(),
            Err(err) => err.to_string(),
        };
        warn!(reason = %note, "planning failed; searching running services with the question");
        (
            self.uniform_plan(question),
            vec![format!("{note}; searching with the question as typed")],
        )
    }

    fn uniform_plan(&self, question: &str) -> SearchPlan {
        let running = self
            .supervisor
            .status()
            .into_iter()
            .filter(|(_, state)| state.accepts_calls())
            .map(|(service, _)| service);
        SearchPlan::uniform(question, running, self.pipeline.settings().per_service_cap)
    }
}
