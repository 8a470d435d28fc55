//! End-to-end search-then-fetch runs against supervised mock backends.
#![cfg(unix)]

mod test_helpers;

use test_helpers::{fast_settings, mock_backend, wait_for_state};
use workspace_finder::search::domain::{PipelineWarning, SearchPlan};
use workspace_finder::search::services::{PipelineSettings, SearchFetchPipeline};
use workspace_finder::service::domain::ServiceKind;
use workspace_finder::supervisor::domain::ProcessState;
use workspace_finder::supervisor::services::Supervisor;

async fn launch_all(supervisor: &Supervisor, services: &[ServiceKind], flags: &[&str]) {
    for service in services {
        supervisor
            .launch(mock_backend(*service, flags))
            .await
            .expect("mock should launch");
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn every_service_contributes_three_fetched_documents() {
    let supervisor = Supervisor::new(fast_settings());
    launch_all(&supervisor, &ServiceKind::ALL, &[]).await;
    let pipeline = SearchFetchPipeline::new(PipelineSettings::default());
    let plan = SearchPlan::uniform("quarterly roadmap", ServiceKind::ALL, 3);

    let output = pipeline.run(&supervisor, &plan).await;

    assert_eq!(output.documents.len(), 9, "warnings: {:?}", output.warnings);
    assert!(output.warnings.is_empty());
    assert!(output.alternatives.is_empty());
    for service in ServiceKind::ALL {
        assert_eq!(output.documents_for(service).count(), 3);
    }
    assert!(output.documents.iter().all(|document| !document.degraded));
    let drive: Vec<_> = output.documents_for(ServiceKind::Drive).collect();
    assert_eq!(
        drive.iter().map(|document| document.content.as_str()).collect::<Vec<_>>(),
        [
            "Contents of gdrive:///mock-file-0",
            "Contents of gdrive:///mock-file-1",
            "Contents of gdrive:///mock-file-2",
        ]
    );
    supervisor.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_backend_yields_a_single_warning() {
    let supervisor = Supervisor::new(fast_settings());
    launch_all(&supervisor, &[ServiceKind::Slack, ServiceKind::Github], &[]).await;
    let pipeline = SearchFetchPipeline::new(PipelineSettings::default());
    let plan = SearchPlan::uniform("quarterly roadmap", ServiceKind::ALL, 3);

    let output = pipeline.run(&supervisor, &plan).await;

    assert_eq!(output.documents.len(), 6);
    assert_eq!(
        output.warnings,
        [PipelineWarning::ServiceSkipped {
            service: ServiceKind::Drive,
            state: None,
        }]
    );
    assert!(
        output
            .warnings
            .first()
            .is_some_and(|warning| warning.to_string().starts_with("drive:"))
    );
    supervisor.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn failing_fetches_fall_back_to_snippets() {
    let supervisor = Supervisor::new(fast_settings());
    launch_all(&supervisor, &[ServiceKind::Github], &["--fail-fetch"]).await;
    let pipeline = SearchFetchPipeline::new(PipelineSettings::default());
    let plan = SearchPlan::uniform("auth middleware", [ServiceKind::Github], 2);

    let output = pipeline.run(&supervisor, &plan).await;

    assert_eq!(output.documents.len(), 2);
    assert!(output.documents.iter().all(|document| document.degraded));
    assert_eq!(output.warnings.len(), 2);
    assert!(output.warnings.iter().all(|warning| matches!(
        warning,
        PipelineWarning::FetchDegraded {
            service: ServiceKind::Github,
            ..
        }
    )));
    supervisor.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn throttled_search_is_reported_once() {
    let supervisor = Supervisor::new(fast_settings());
    launch_all(&supervisor, &[ServiceKind::Slack], &["--rate-limit-search"]).await;
    let pipeline = SearchFetchPipeline::new(PipelineSettings::default());
    let plan = SearchPlan::uniform("incident", [ServiceKind::Slack], 3)
        .with_alternatives(["outage postmortem".to_owned()]);

    let output = pipeline.run(&supervisor, &plan).await;

    assert!(output.documents.is_empty());
    assert_eq!(
        output.warnings,
        [PipelineWarning::SearchRateLimited {
            service: ServiceKind::Slack,
        }]
    );
    assert_eq!(output.alternatives, ["outage postmortem"]);
    assert_eq!(
        wait_for_state(&supervisor, ServiceKind::Slack, ProcessState::Running)
            .await
            .restart_count,
        0
    );
    supervisor.shutdown().await;
}
