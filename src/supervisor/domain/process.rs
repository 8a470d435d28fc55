//! Runtime process aggregate root.

use super::{ProcessState, SupervisorDomainError};
use crate::service::domain::ServiceKind;
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One recorded lifecycle transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateTransition {
    /// State before the transition.
    pub from: ProcessState,
    /// State after the transition.
    pub to: ProcessState,
    /// When the transition happened.
    pub at: DateTime<Utc>,
}

/// Point-in-time view of a supervised process, for status reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessSnapshot {
    /// Supervised service.
    pub service: ServiceKind,
    /// Current state.
    pub state: ProcessState,
    /// Restarts performed so far.
    pub restart_count: u32,
    /// Time of the latest transition.
    pub last_transition_at: DateTime<Utc>,
    /// Identifier of the current child process incarnation.
    pub incarnation: Uuid,
    /// Reason attached to the latest failure, if any.
    pub detail: Option<String>,
}

/// The supervisor's record of one backend process.
///
/// Holds lifecycle state and history only; the process handle itself stays
/// with the supervisor's monitor task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeProcess {
    service: ServiceKind,
    state: ProcessState,
    restart_count: u32,
    incarnation: Uuid,
    detail: Option<String>,
    created_at: DateTime<Utc>,
    last_transition_at: DateTime<Utc>,
    transitions: Vec<StateTransition>,
}

impl RuntimeProcess {
    /// Creates a record in [`ProcessState::Launching`].
    #[must_use]
    pub fn new(service: ServiceKind, clock: &impl Clock) -> Self {
        let timestamp = clock.utc();
        Self {
            service,
            state: ProcessState::Launching,
            restart_count: 0,
            incarnation: Uuid::new_v4(),
            detail: None,
            created_at: timestamp,
            last_transition_at: timestamp,
            transitions: Vec::new(),
        }
    }

    /// Returns the supervised service.
    #[must_use]
    pub const fn service(&self) -> ServiceKind {
        self.service
    }

    /// Returns the current state.
    #[must_use]
    pub const fn state(&self) -> ProcessState {
        self.state
    }

    /// Returns the number of restarts performed.
    #[must_use]
    pub const fn restart_count(&self) -> u32 {
        self.restart_count
    }

    /// Returns the current incarnation identifier.
    #[must_use]
    pub const fn incarnation(&self) -> Uuid {
        self.incarnation
    }

    /// Returns the latest failure reason.
    #[must_use]
    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }

    /// Returns when the record was created.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns every transition in order.
    #[must_use]
    pub fn transitions(&self) -> &[StateTransition] {
        &self.transitions
    }

    /// Returns whether the process ever reached `state`.
    #[must_use]
    pub fn has_visited(&self, state: ProcessState) -> bool {
        self.transitions.iter().any(|transition| transition.to == state)
    }

    /// Moves to `target`, recording the transition.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorDomainError::InvalidTransition`] when the
    /// lifecycle does not allow the move.
    pub fn transition_to(
        &mut self,
        target: ProcessState,
        clock: &impl Clock,
    ) -> Result<(), SupervisorDomainError> {
        if !self.state.can_transition_to(target) {
            return Err(SupervisorDomainError::InvalidTransition {
                service: self.service,
                from: self.state,
                to: target,
            });
        }

        let timestamp = clock.utc();
        self.transitions.push(StateTransition {
            from: self.state,
            to: target,
            at: timestamp,
        });
        self.state = target;
        self.last_transition_at = timestamp;
        if target == ProcessState::Running {
            self.detail = None;
        }
        Ok(())
    }

    /// Moves to `target` and records why.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorDomainError::InvalidTransition`] when the
    /// lifecycle does not allow the move.
    pub fn fail_to(
        &mut self,
        target: ProcessState,
        reason: impl Into<String>,
        clock: &impl Clock,
    ) -> Result<(), SupervisorDomainError> {
        self.transition_to(target, clock)?;
        self.detail = Some(reason.into());
        Ok(())
    }

    /// Enters `Restarting`, counting the attempt.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorDomainError::InvalidTransition`] unless the
    /// process is `Crashed`.
    pub fn begin_restart(&mut self, clock: &impl Clock) -> Result<u32, SupervisorDomainError> {
        self.transition_to(ProcessState::Restarting, clock)?;
        self.restart_count = self.restart_count.saturating_add(1);
        Ok(self.restart_count)
    }

    /// Re-enters `Launching` with a fresh incarnation.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorDomainError::InvalidTransition`] unless the
    /// process is `Restarting`.
    pub fn relaunch(&mut self, clock: &impl Clock) -> Result<(), SupervisorDomainError> {
        self.transition_to(ProcessState::Launching, clock)?;
        self.incarnation = Uuid::new_v4();
        Ok(())
    }

    /// Returns a status snapshot.
    #[must_use]
    pub fn snapshot(&self) -> ProcessSnapshot {
        ProcessSnapshot {
            service: self.service,
            state: self.state,
            restart_count: self.restart_count,
            last_transition_at: self.last_transition_at,
            incarnation: self.incarnation,
            detail: self.detail.clone(),
        }
    }
}
