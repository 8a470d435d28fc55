//! Shared per-service state owned by the supervisor.

use crate::rpc::RpcClient;
use crate::service::domain::ServiceKind;
use crate::supervisor::domain::{
    ProcessSnapshot, ProcessState, RuntimeProcess, StateTransition, SupervisorDomainError,
};
use mockable::Clock;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Record, live client and change feed for one supervised service.
pub(super) struct Slot {
    record: Mutex<RuntimeProcess>,
    client: Mutex<Option<Arc<RpcClient>>>,
    monitor: Mutex<Option<JoinHandle<()>>>,
    updates: watch::Sender<ProcessSnapshot>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Slot {
    pub(super) fn new(service: ServiceKind, clock: &impl Clock) -> Self {
        let record = RuntimeProcess::new(service, clock);
        let (updates, _) = watch::channel(record.snapshot());
        Self {
            record: Mutex::new(record),
            client: Mutex::new(None),
            monitor: Mutex::new(None),
            updates,
        }
    }

    pub(super) fn service(&self) -> ServiceKind {
        lock(&self.record).service()
    }

    pub(super) fn snapshot(&self) -> ProcessSnapshot {
        lock(&self.record).snapshot()
    }

    pub(super) fn state(&self) -> ProcessState {
        lock(&self.record).state()
    }

    pub(super) fn restart_count(&self) -> u32 {
        lock(&self.record).restart_count()
    }

    pub(super) fn history(&self) -> Vec<StateTransition> {
        lock(&self.record).transitions().to_vec()
    }

    pub(super) fn subscribe(&self) -> watch::Receiver<ProcessSnapshot> {
        self.updates.subscribe()
    }

    /// Applies `change` to the record and publishes the new snapshot.
    fn apply(
        &self,
        change: impl FnOnce(&mut RuntimeProcess) -> Result<(), SupervisorDomainError>,
    ) -> Result<ProcessSnapshot, SupervisorDomainError> {
        let snapshot = {
            let mut record = lock(&self.record);
            change(&mut record)?;
            record.snapshot()
        };
        log_transition(&snapshot);
        self.updates.send_replace(snapshot.clone());
        Ok(snapshot)
    }

    pub(super) fn transition(
        &self,
        target: ProcessState,
        clock: &impl Clock,
    ) -> Result<ProcessSnapshot, SupervisorDomainError> {
        self.apply(|record| record.transition_to(target, clock))
    }

    pub(super) fn fail(
        &self,
        target: ProcessState,
        reason: impl Into<String>,
        clock: &impl Clock,
    ) -> Result<ProcessSnapshot, SupervisorDomainError> {
        let detail = reason.into();
        self.apply(|record| record.fail_to(target, detail, clock))
    }

    pub(super) fn begin_restart(
        &self,
        clock: &impl Clock,
    ) -> Result<ProcessSnapshot, SupervisorDomainError> {
        self.apply(|record| record.begin_restart(clock).map(drop))
    }

    pub(super) fn relaunch(
        &self,
        clock: &impl Clock,
    ) -> Result<ProcessSnapshot, SupervisorDomainError> {
        self.apply(|record| record.relaunch(clock))
    }

    /// Moves a non-terminal record to `Stopped`; terminal records are left
    /// untouched.
    pub(super) fn stop(&self, clock: &impl Clock) {
        if self.state().is_terminal() {
            return;
        }
        if let Err(err) = self.transition(ProcessState::Stopped, clock) {
            warn!(error = %err, "failed to record stop");
        }
    }

    pub(super) fn client(&self) -> Option<Arc<RpcClient>> {
        lock(&self.client).clone()
    }

    pub(super) fn set_client(&self, client: Arc<RpcClient>) {
        *lock(&self.client) = Some(client);
    }

    pub(super) fn take_client(&self) -> Option<Arc<RpcClient>> {
        lock(&self.client).take()
    }

    pub(super) fn set_monitor(&self, handle: JoinHandle<()>) {
        *lock(&self.monitor) = Some(handle);
    }

    pub(super) fn take_monitor(&self) -> Option<JoinHandle<()>> {
        lock(&self.monitor).take()
    }
}

fn log_transition(snapshot: &ProcessSnapshot) {
    let detail = snapshot.detail.as_deref().unwrap_or_default();
    match snapshot.state {
        ProcessState::Crashed | ProcessState::Failed | ProcessState::PermanentFailure => warn!(
            service = %snapshot.service,
            state = %snapshot.state,
            restarts = snapshot.restart_count,
            detail,
            "backend state changed"
        ),
        _ => info!(
            service = %snapshot.service,
            state = %snapshot.state,
            restarts = snapshot.restart_count,
            "backend state changed"
        ),
    }
}
