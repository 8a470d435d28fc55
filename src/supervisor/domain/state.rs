//! Process lifecycle states.

use super::ParseProcessStateError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of one supervised backend process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
    /// The child process is being spawned.
    Launching,
    /// Spawned; waiting for the readiness signal.
    WaitingReadiness,
    /// Readiness observed; handshake pending.
    Ready,
    /// Handshake complete; accepting calls.
    Running,
    /// Exited cleanly or was shut down.
    Stopped,
    /// Exited unexpectedly; awaiting classification.
    Crashed,
    /// Backing off before a relaunch.
    Restarting,
    /// Could not be brought up; not retried.
    Failed,
    /// Crashed beyond recovery; not retried.
    PermanentFailure,
}

impl ProcessState {
    /// Returns the canonical name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Launching => "launching",
            Self::WaitingReadiness => "waiting_readiness",
            Self::Ready => "ready",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Crashed => "crashed",
            Self::Restarting => "restarting",
            Self::Failed => "failed",
            Self::PermanentFailure => "permanent_failure",
        }
    }

    /// Returns whether no further transition can happen.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::Failed | Self::PermanentFailure)
    }

    /// Returns whether calls may be issued to the process.
    #[must_use]
    pub const fn accepts_calls(self) -> bool {
        matches!(self, Self::Running)
    }

    /// Returns whether transition to `target` is allowed.
    ///
    /// Every non-terminal state may move to `Stopped` on shutdown. Failures
    /// before `Running` go to `Failed` on first launch and to `Crashed` when
    /// they happen during a restart.
    #[must_use]
    pub const fn can_transition_to(self, target: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        matches!(
            (self, target),
            (_, Self::Stopped)
                | (Self::Launching, Self::WaitingReadiness | Self::Failed)
                | (
                    Self::WaitingReadiness,
                    Self::Ready | Self::Failed | Self::Crashed
                )
                | (Self::Ready, Self::Running | Self::Failed | Self::Crashed)
                | (Self::Running, Self::Crashed)
                | (Self::Crashed, Self::Restarting | Self::PermanentFailure)
                | (Self::Restarting, Self::Launching)
        )
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ProcessState {
    type Error = ParseProcessStateError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "launching" => Ok(Self::Launching),
            "waiting_readiness" => Ok(Self::WaitingReadiness),
            "ready" => Ok(Self::Ready),
            "running" => Ok(Self::Running),
            "stopped" => Ok(Self::Stopped),
            "crashed" => Ok(Self::Crashed),
            "restarting" => Ok(Self::Restarting),
            "failed" => Ok(Self::Failed),
            "permanent_failure" => Ok(Self::PermanentFailure),
            _ => Err(ParseProcessStateError(value.to_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ProcessState::Launching, ProcessState::WaitingReadiness, true)]
    #[case(ProcessState::Launching, ProcessState::Failed, true)]
    #[case(ProcessState::Launching, ProcessState::Running, false)]
    #[case(ProcessState::WaitingReadiness, ProcessState::Ready, true)]
    #[case(ProcessState::WaitingReadiness, ProcessState::Failed, true)]
    #[case(ProcessState::WaitingReadiness, ProcessState::Running, false)]
    #[case(ProcessState::Ready, ProcessState::Running, true)]
    #[case(ProcessState::Running, ProcessState::Crashed, true)]
    #[case(ProcessState::Running, ProcessState::Stopped, true)]
    #[case(ProcessState::Running, ProcessState::Failed, false)]
    #[case(ProcessState::Crashed, ProcessState::Restarting, true)]
    #[case(ProcessState::Crashed, ProcessState::PermanentFailure, true)]
    #[case(ProcessState::Crashed, ProcessState::Running, false)]
    #[case(ProcessState::Restarting, ProcessState::Launching, true)]
    #[case(ProcessState::Restarting, ProcessState::Running, false)]
    #[case(ProcessState::Failed, ProcessState::Launching, false)]
    #[case(ProcessState::PermanentFailure, ProcessState::Restarting, false)]
    #[case(ProcessState::Stopped, ProcessState::Stopped, false)]
    fn transition_matrix(
        #[case] current: ProcessState,
        #[case] target: ProcessState,
        #[case] expected: bool,
    ) {
        assert_eq!(current.can_transition_to(target), expected);
    }

    #[rstest]
    #[case(ProcessState::Stopped)]
    #[case(ProcessState::Failed)]
    #[case(ProcessState::PermanentFailure)]
    fn terminal_states_round_trip_through_names(#[case] state: ProcessState) {
        assert!(state.is_terminal());
        assert_eq!(ProcessState::try_from(state.as_str()), Ok(state));
    }

    #[test]
    fn only_running_accepts_calls() {
        assert!(ProcessState::Running.accepts_calls());
        assert!(!ProcessState::Ready.accepts_calls());
        assert!(!ProcessState::Restarting.accepts_calls());
    }
}
