//! Process supervisor: spawn, readiness, monitoring, restart, shutdown.

use super::slot::Slot;
use super::{SupervisorError, SupervisorResult, SupervisorSettings};
use crate::rpc::{RpcClient, RpcError};
use crate::service::domain::{ReadinessProbe, ServiceDefinition, ServiceKind};
use crate::supervisor::adapters::{
    ReadinessError, SpawnedChild, StderrTail, await_readiness, exit_of, terminate,
};
use crate::supervisor::domain::{
    CrashVerdict, ProcessExit, ProcessSnapshot, ProcessState, StateTransition,
    SupervisorDomainError,
};
use mockable::{Clock, DefaultClock};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::process::Child;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A process that completed bring-up.
struct LiveProcess {
    child: Child,
    stderr: StderrTail,
    client: Arc<RpcClient>,
}

/// A bring-up attempt that did not reach `Running`.
struct BringUpFailure {
    error: SupervisorError,
    exit: Option<ProcessExit>,
    stderr_tail: Vec<String>,
}

impl BringUpFailure {
    const fn bare(error: SupervisorError) -> Self {
        Self {
            error,
            exit: None,
            stderr_tail: Vec::new(),
        }
    }
}

impl From<SupervisorDomainError> for BringUpFailure {
    fn from(err: SupervisorDomainError) -> Self {
        Self::bare(err.into())
    }
}

struct Shared<C> {
    settings: SupervisorSettings,
    clock: Arc<C>,
    shutdown: CancellationToken,
    slots: Mutex<BTreeMap<ServiceKind, Arc<Slot>>>,
}

impl<C> Shared<C> {
    fn slots(&self) -> MutexGuard<'_, BTreeMap<ServiceKind, Arc<Slot>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn slot(&self, service: ServiceKind) -> SupervisorResult<Arc<Slot>> {
        self.slots()
            .get(&service)
            .cloned()
            .ok_or(SupervisorError::UnknownService(service))
    }
}

/// Owns every backend child process and its lifecycle.
///
/// The supervisor is the only holder of process handles. Callers observe
/// processes through snapshots and obtain RPC clients for `Running`
/// services; they never see exit statuses directly.
pub struct Supervisor<C = DefaultClock>
where
    C: Clock + Send + Sync + 'static,
{
    shared: Arc<Shared<C>>,
}

impl Supervisor<DefaultClock> {
    /// Creates a supervisor using the system clock.
    #[must_use]
    pub fn new(settings: SupervisorSettings) -> Self {
        Self::with_clock(settings, Arc::new(DefaultClock))
    }
}

impl<C> Supervisor<C>
where
    C: Clock + Send + Sync + 'static,
{
    /// Creates a supervisor that timestamps transitions with `clock`.
    #[must_use]
    pub fn with_clock(settings: SupervisorSettings, clock: Arc<C>) -> Self {
        Self {
            shared: Arc::new(Shared {
                settings,
                clock,
                shutdown: CancellationToken::new(),
                slots: Mutex::new(BTreeMap::new()),
            }),
        }
    }

    /// Returns the active settings.
    #[must_use]
    pub fn settings(&self) -> &SupervisorSettings {
        &self.shared.settings
    }

    /// Launches a backend and waits until it is `Running`.
    ///
    /// Failures during the initial bring-up are terminal: the process ends
    /// in `Failed` and is not retried. Once running, the process is
    /// monitored in the background and restarted on crashes.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::Spawn`], [`SupervisorError::ReadinessTimeout`],
    /// [`SupervisorError::ReadinessFailure`] or [`SupervisorError::Handshake`]
    /// when bring-up fails, [`SupervisorError::AlreadyLaunched`] when the
    /// service is already live, and [`SupervisorError::ShuttingDown`] after
    /// [`Self::shutdown`] has begun.
    pub async fn launch(&self, definition: ServiceDefinition) -> SupervisorResult<ProcessSnapshot> {
        let shared = &self.shared;
        if shared.shutdown.is_cancelled() {
            return Err(SupervisorError::ShuttingDown);
        }
        let service = definition.service();
        let slot = {
            let mut slots = shared.slots();
            if let Some(existing) = slots.get(&service) {
                if !existing.state().is_terminal() {
                    return Err(SupervisorError::AlreadyLaunched(service));
                }
            }
            let created = Arc::new(Slot::new(service, &*shared.clock));
            slots.insert(service, Arc::clone(&created));
            created
        };
        info!(service = %service, mode = %definition.mode(), "launching backend");

        let outcome = tokio::select! {
            result = bring_up(shared, &slot, &definition) => result,
            () = shared.shutdown.cancelled() => Err(BringUpFailure::bare(SupervisorError::ShuttingDown)),
        };
        match outcome {
            Ok(live) => {
                slot.set_client(Arc::clone(&live.client));
                let snapshot = slot.snapshot();
                let handle = tokio::spawn(monitor(
                    Arc::clone(shared),
                    Arc::clone(&slot),
                    definition,
                    live,
                ));
                slot.set_monitor(handle);
                Ok(snapshot)
            }
            Err(failure) => {
                if matches!(failure.error, SupervisorError::ShuttingDown) {
                    slot.stop(&*shared.clock);
                } else if !slot.state().is_terminal() {
                    slot.fail(ProcessState::Failed, failure.error.to_string(), &*shared.clock)?;
                }
                Err(failure.error)
            }
        }
    }

    /// Returns the current state of every supervised service.
    #[must_use]
    pub fn status(&self) -> BTreeMap<ServiceKind, ProcessState> {
        self.shared
            .slots()
            .iter()
            .map(|(service, slot)| (*service, slot.state()))
            .collect()
    }

    /// Returns detailed snapshots for every supervised service.
    #[must_use]
    pub fn snapshots(&self) -> Vec<ProcessSnapshot> {
        self.shared
            .slots()
            .values()
            .map(|slot| slot.snapshot())
            .collect()
    }

    /// Returns the snapshot for one service.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::UnknownService`] for unsupervised services.
    pub fn snapshot(&self, service: ServiceKind) -> SupervisorResult<ProcessSnapshot> {
        Ok(self.shared.slot(service)?.snapshot())
    }

    /// Returns the full transition history of one service.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::UnknownService`] for unsupervised services.
    pub fn history(&self, service: ServiceKind) -> SupervisorResult<Vec<StateTransition>> {
        Ok(self.shared.slot(service)?.history())
    }

    /// Subscribes to snapshot changes for one service.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::UnknownService`] for unsupervised services.
    pub fn subscribe(
        &self,
        service: ServiceKind,
    ) -> SupervisorResult<watch::Receiver<ProcessSnapshot>> {
        Ok(self.shared.slot(service)?.subscribe())
    }

    /// Returns the RPC client of a `Running` service.
    #[must_use]
    pub fn client(&self, service: ServiceKind) -> Option<Arc<RpcClient>> {
        let slot = self.shared.slot(service).ok()?;
        if !slot.state().accepts_calls() {
            return None;
        }
        slot.client()
    }

    /// Stops every process and waits for their monitors to finish.
    ///
    /// Processes receive a termination signal and are killed if they have
    /// not exited within the configured grace period. Pending calls on their
    /// clients fail with a transport-closed error. Idempotent.
    pub async fn shutdown(&self) {
        let shared = &self.shared;
        shared.shutdown.cancel();
        let slots: Vec<Arc<Slot>> = shared.slots().values().cloned().collect();
        for slot in &slots {
            if let Some(handle) = slot.take_monitor() {
                if let Err(err) = handle.await {
                    warn!(service = %slot.service(), error = %err, "monitor task failed");
                }
            }
            drop(slot.take_client());
            slot.stop(&*shared.clock);
        }
        info!(services = slots.len(), "supervisor shut down");
    }
}

impl<C> Drop for Supervisor<C>
where
    C: Clock + Send + Sync + 'static,
{
    fn drop(&mut self) {
        self.shared.shutdown.cancel();
    }
}

impl<C> std::fmt::Debug for Supervisor<C>
where
    C: Clock + Send + Sync + 'static,
{
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Supervisor")
            .field("settings", &self.shared.settings)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

/// Runs spawn, readiness and handshake, recording each transition.
async fn bring_up<C>(
    shared: &Shared<C>,
    slot: &Slot,
    definition: &ServiceDefinition,
) -> Result<LiveProcess, BringUpFailure>
where
    C: Clock + Send + Sync,
{
    let service = definition.service();
    let label = service.as_str();
    let clock = &*shared.clock;
    let settings = &shared.settings;
    let probe = definition.readiness();

    let mut spawned = SpawnedChild::spawn(label, definition.command())
        .map_err(|err| BringUpFailure::bare(SupervisorError::spawn(service, err)))?;
    slot.transition(ProcessState::WaitingReadiness, clock)?;

    if let Err(err) =
        await_readiness(label, &probe, &mut spawned, settings.readiness_timeout).await
    {
        let exit = match &err {
            ReadinessError::Exited(exit) => *exit,
            ReadinessError::Timeout(_) | ReadinessError::Io(_) => {
                terminate(label, &mut spawned.child, settings.shutdown_grace).await
            }
        };
        let error = match err {
            ReadinessError::Timeout(after) => SupervisorError::ReadinessTimeout { service, after },
            other => SupervisorError::ReadinessFailure {
                service,
                reason: other.to_string(),
            },
        };
        return Err(BringUpFailure {
            error,
            exit,
            stderr_tail: spawned.stderr.snapshot(),
        });
    }
    slot.transition(ProcessState::Ready, clock)?;

    let SpawnedChild {
        mut child,
        stdin,
        stdout,
        stderr,
    } = spawned;
    let client = Arc::new(
        RpcClient::spawn(label, stdout, stdin).with_default_timeout(settings.call_timeout),
    );
    let handshake_timeout = if probe == ReadinessProbe::Handshake {
        settings.readiness_timeout
    } else {
        settings.handshake_timeout
    };

    let handshake = tokio::select! {
        result = client.initialize(handshake_timeout) => result.map(drop),
        status = child.wait() => {
            debug!(service = %service, status = ?status, "backend exited during handshake");
            Err(RpcError::TransportClosed)
        }
    };
    if let Err(err) = handshake {
        let exit = terminate(label, &mut child, settings.shutdown_grace).await;
        let error = match (&probe, &err) {
            (ReadinessProbe::Handshake, RpcError::Timeout { .. }) => {
                SupervisorError::ReadinessTimeout {
                    service,
                    after: handshake_timeout,
                }
            }
            (ReadinessProbe::Handshake, _) => SupervisorError::ReadinessFailure {
                service,
                reason: err.to_string(),
            },
            _ => SupervisorError::Handshake {
                service,
                source: err,
            },
        };
        return Err(BringUpFailure {
            error,
            exit,
            stderr_tail: stderr.snapshot(),
        });
    }

    slot.transition(ProcessState::Running, clock)?;
    Ok(LiveProcess {
        child,
        stderr,
        client,
    })
}

/// Watches a running process until shutdown or permanent failure,
/// restarting it after crashes.
async fn monitor<C>(
    shared: Arc<Shared<C>>,
    slot: Arc<Slot>,
    definition: ServiceDefinition,
    mut live: LiveProcess,
) where
    C: Clock + Send + Sync,
{
    let service = definition.service();
    let label = service.as_str();
    let clock = &*shared.clock;
    let grace = shared.settings.shutdown_grace;
    loop {
        let (exit, hung_up) = tokio::select! {
            biased;
            () = shared.shutdown.cancelled() => {
                drop(slot.take_client());
                drop(live.client);
                terminate(label, &mut live.child, grace).await;
                slot.stop(clock);
                return;
            }
            status = live.child.wait() => (status.ok().map(exit_of), false),
            () = live.client.closed() => reap_after_hangup(label, &mut live.child, grace).await,
        };
        drop(slot.take_client());

        if !hung_up && exit.is_some_and(ProcessExit::success) {
            info!(service = %service, "backend exited cleanly");
            slot.stop(clock);
            return;
        }

        let reason = if hung_up {
            "closed its stdout while running".to_owned()
        } else {
            exit.map_or_else(
                || "exited with unknown status".to_owned(),
                |status| format!("exited with {status}"),
            )
        };
        if let Err(err) = slot.fail(ProcessState::Crashed, reason, clock) {
            warn!(service = %service, error = %err, "failed to record crash");
            return;
        }

        match recover(&shared, &slot, &definition, exit, live.stderr.snapshot()).await {
            Some(next) => live = next,
            None => return,
        }
    }
}

/// Ends a child whose protocol stream closed. The child gets the grace
/// period to exit on its own and is terminated after that; the flag reports
/// whether termination was needed.
async fn reap_after_hangup(
    label: &str,
    child: &mut Child,
    grace: std::time::Duration,
) -> (Option<ProcessExit>, bool) {
    if let Ok(status) = tokio::time::timeout(grace, child.wait()).await {
        return (status.ok().map(exit_of), false);
    }
    warn!(backend = %label, "backend closed its stdout but kept running, terminating");
    (terminate(label, child, grace).await, true)
}

/// Classifies a crash and restarts until a bring-up succeeds or the
/// process is given up on.
async fn recover<C>(
    shared: &Shared<C>,
    slot: &Slot,
    definition: &ServiceDefinition,
    first_exit: Option<ProcessExit>,
    first_tail: Vec<String>,
) -> Option<LiveProcess>
where
    C: Clock + Send + Sync,
{
    let service = definition.service();
    let clock = &*shared.clock;
    let classifier = shared.settings.classifier();
    let mut exit = first_exit;
    let mut stderr_tail = first_tail;

    loop {
        let delay = match classifier.classify(exit, &stderr_tail, slot.restart_count()) {
            CrashVerdict::Restart { attempt, delay } => {
                warn!(service = %service, attempt, delay = ?delay, "restarting backend");
                delay
            }
            verdict @ (CrashVerdict::AuthFailure(_) | CrashVerdict::BudgetExhausted { .. }) => {
                let reason = verdict.reason().unwrap_or_default();
                if let Err(err) = slot.fail(ProcessState::PermanentFailure, reason, clock) {
                    warn!(service = %service, error = %err, "failed to record permanent failure");
                }
                return None;
            }
        };

        if let Err(err) = slot.begin_restart(clock) {
            warn!(service = %service, error = %err, "failed to record restart");
            return None;
        }
        tokio::select! {
            () = tokio::time::sleep(delay) => {}
            () = shared.shutdown.cancelled() => {
                slot.stop(clock);
                return None;
            }
        }
        if let Err(err) = slot.relaunch(clock) {
            warn!(service = %service, error = %err, "failed to record relaunch");
            return None;
        }

        let outcome = tokio::select! {
            result = bring_up(shared, slot, definition) => result,
            () = shared.shutdown.cancelled() => {
                slot.stop(clock);
                return None;
            }
        };
        match outcome {
            Ok(live) => {
                slot.set_client(Arc::clone(&live.client));
                return Some(live);
            }
            Err(failure) => {
                let target = if matches!(failure.error, SupervisorError::Spawn { .. }) {
                    ProcessState::Failed
                } else {
                    ProcessState::Crashed
                };
                if let Err(err) = slot.fail(target, failure.error.to_string(), clock) {
                    warn!(service = %service, error = %err, "failed to record restart failure");
                    return None;
                }
                if target == ProcessState::Failed {
                    return None;
                }
                exit = failure.exit;
                stderr_tail = failure.stderr_tail;
            }
        }
    }
}
