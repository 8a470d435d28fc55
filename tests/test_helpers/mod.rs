//! Shared helpers for integration tests that drive the mock backend.

use std::time::Duration;

use workspace_finder::service::domain::{LaunchCommand, ServiceDefinition, ServiceKind};
use workspace_finder::supervisor::domain::{ProcessSnapshot, ProcessState};
use workspace_finder::supervisor::services::{Supervisor, SupervisorSettings};

const WAIT_LIMIT: Duration = Duration::from_secs(15);

/// Path of the mock backend binary built alongside the tests.
pub const MOCK_BACKEND: &str = env!("CARGO_BIN_EXE_mock-backend");

/// Settings with short backoffs so restart scenarios finish quickly.
pub fn fast_settings() -> SupervisorSettings {
    SupervisorSettings {
        readiness_timeout: Duration::from_secs(5),
        handshake_timeout: Duration::from_secs(5),
        call_timeout: Duration::from_secs(5),
        max_restarts: 2,
        restart_backoff: Duration::from_millis(20),
        shutdown_grace: Duration::from_millis(500),
    }
}

/// Mock definition for `service` with extra command-line flags.
pub fn mock_backend(service: ServiceKind, flags: &[&str]) -> ServiceDefinition {
    let command = LaunchCommand::new(MOCK_BACKEND)
        .expect("mock backend path is a valid command")
        .with_args(["--service", service.as_str()].iter().chain(flags).copied());
    ServiceDefinition::mock(service, command)
}

/// Waits until `service` reaches `state`, panicking after a generous limit.
pub async fn wait_for_state(
    supervisor: &Supervisor,
    service: ServiceKind,
    state: ProcessState,
) -> ProcessSnapshot {
    wait_for(supervisor, service, |snapshot| snapshot.state == state).await
}

/// Waits until a snapshot of `service` satisfies `predicate`.
pub async fn wait_for(
    supervisor: &Supervisor,
    service: ServiceKind,
    predicate: impl FnMut(&ProcessSnapshot) -> bool,
) -> ProcessSnapshot {
    let mut updates = supervisor
        .subscribe(service)
        .expect("service should be supervised");
    let reached = tokio::time::timeout(WAIT_LIMIT, updates.wait_for(predicate))
        .await
        .unwrap_or_else(|_| panic!("{service} did not reach the expected state in time"))
        .expect("snapshot channel should stay open");
    reached.clone()
}
