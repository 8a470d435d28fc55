//! Crash classification and restart backoff.

use std::fmt;
use std::time::Duration;

/// Exit code reserved by backends for authentication failures.
pub const AUTH_EXIT_CODE: i32 = 77;

const AUTH_KEYWORDS: [&str; 6] = [
    "auth",
    "credential",
    "unauthorized",
    "forbidden",
    "permission",
    "invalid token",
];

/// How a child process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProcessExit {
    /// Exit code, when the process exited normally.
    pub code: Option<i32>,
    /// Terminating signal, when killed by one.
    pub signal: Option<i32>,
}

impl ProcessExit {
    /// Returns whether the process exited with status 0.
    #[must_use]
    pub const fn success(self) -> bool {
        matches!(self.code, Some(0))
    }
}

impl fmt::Display for ProcessExit {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(formatter, "exit code {code}"),
            (None, Some(signal)) => write!(formatter, "signal {signal}"),
            (None, None) => formatter.write_str("unknown exit status"),
        }
    }
}

/// What to do after a crash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrashVerdict {
    /// Relaunch after `delay`; `attempt` counts from 1.
    Restart {
        /// Restart attempt number.
        attempt: u32,
        /// Backoff before relaunching.
        delay: Duration,
    },
    /// Credentials were rejected; restarting cannot help.
    AuthFailure(String),
    /// The restart budget is spent.
    BudgetExhausted {
        /// Restarts already performed.
        restarts: u32,
    },
}

impl CrashVerdict {
    /// Returns a human-readable reason for permanent verdicts.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        match self {
            Self::Restart { .. } => None,
            Self::AuthFailure(evidence) => Some(format!("authentication failure: {evidence}")),
            Self::BudgetExhausted { restarts } => {
                Some(format!("restart budget exhausted after {restarts} restarts"))
            }
        }
    }
}

/// Routes crashes to a restart or to permanent failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrashClassifier {
    max_restarts: u32,
    backoff_base: Duration,
}

impl CrashClassifier {
    /// Creates a classifier with a restart cap and base backoff.
    #[must_use]
    pub const fn new(max_restarts: u32, backoff_base: Duration) -> Self {
        Self {
            max_restarts,
            backoff_base,
        }
    }

    /// Returns the restart cap.
    #[must_use]
    pub const fn max_restarts(&self) -> u32 {
        self.max_restarts
    }

    /// Classifies a crash given the exit status, the tail of stderr and the
    /// restarts already performed.
    #[must_use]
    pub fn classify(
        &self,
        exit: Option<ProcessExit>,
        stderr_tail: &[String],
        restarts_so_far: u32,
    ) -> CrashVerdict {
        if let Some(evidence) = auth_evidence(exit, stderr_tail) {
            return CrashVerdict::AuthFailure(evidence);
        }
        if restarts_so_far >= self.max_restarts {
            return CrashVerdict::BudgetExhausted {
                restarts: restarts_so_far,
            };
        }
        CrashVerdict::Restart {
            attempt: restarts_so_far.saturating_add(1),
            delay: self.backoff_for(restarts_so_far),
        }
    }

    /// Returns the delay before the restart following `restarts_so_far`
    /// earlier restarts: the base, doubled per earlier restart.
    #[must_use]
    pub fn backoff_for(&self, restarts_so_far: u32) -> Duration {
        let factor = 1_u32.checked_shl(restarts_so_far.min(16)).unwrap_or(u32::MAX);
        self.backoff_base.saturating_mul(factor)
    }
}

fn auth_evidence(exit: Option<ProcessExit>, stderr_tail: &[String]) -> Option<String> {
    if exit.and_then(|status| status.code) == Some(AUTH_EXIT_CODE) {
        return Some(format!("exit code {AUTH_EXIT_CODE}"));
    }
    stderr_tail.iter().rev().find_map(|line| {
        let lowered = line.to_ascii_lowercase();
        AUTH_KEYWORDS
            .iter()
            .any(|keyword| lowered.contains(keyword))
            .then(|| line.trim().to_owned())
    })
}
