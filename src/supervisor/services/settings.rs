//! Supervisor timing and restart settings.

use crate::supervisor::domain::CrashClassifier;
use std::time::Duration;

/// Timeouts and restart policy applied to every supervised process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorSettings {
    /// Bound on waiting for the readiness signal.
    pub readiness_timeout: Duration,
    /// Bound on the `initialize` handshake.
    pub handshake_timeout: Duration,
    /// Default timeout for calls issued through the process's client.
    pub call_timeout: Duration,
    /// Restarts allowed before a crash becomes permanent.
    pub max_restarts: u32,
    /// Delay before the first restart; doubled for each later one.
    pub restart_backoff: Duration,
    /// Time a process gets to exit after the termination signal.
    pub shutdown_grace: Duration,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            readiness_timeout: Duration::from_secs(10),
            handshake_timeout: Duration::from_secs(10),
            call_timeout: Duration::from_secs(30),
            max_restarts: 3,
            restart_backoff: Duration::from_millis(500),
            shutdown_grace: Duration::from_secs(2),
        }
    }
}

impl SupervisorSettings {
    /// Returns the crash classifier for these settings.
    #[must_use]
    pub const fn classifier(&self) -> CrashClassifier {
        CrashClassifier::new(self.max_restarts, self.restart_backoff)
    }
}
