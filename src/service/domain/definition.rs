//! Service definition handed from configuration to the supervisor.

use super::{LaunchCommand, ReadinessProbe, RunMode, ServiceKind};
use std::path::PathBuf;

/// Everything the supervisor needs to run one backend.
///
/// The mode is already resolved: `command` is the real server in
/// [`RunMode::Real`] and the mock server in [`RunMode::Mock`]. Immutable
/// once built; the supervisor only reads it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDefinition {
    service: ServiceKind,
    mode: RunMode,
    command: LaunchCommand,
    auth_files: Vec<PathBuf>,
    readiness: Option<ReadinessProbe>,
}

impl ServiceDefinition {
    /// Creates a definition running the real backend.
    #[must_use]
    pub const fn real(service: ServiceKind, command: LaunchCommand) -> Self {
        Self::new(service, RunMode::Real, command)
    }

    /// Creates a definition running the mock backend.
    #[must_use]
    pub const fn mock(service: ServiceKind, command: LaunchCommand) -> Self {
        Self::new(service, RunMode::Mock, command)
    }

    /// Creates a definition for an explicit mode.
    #[must_use]
    pub const fn new(service: ServiceKind, mode: RunMode, command: LaunchCommand) -> Self {
        Self {
            service,
            mode,
            command,
            auth_files: Vec::new(),
            readiness: None,
        }
    }

    /// Replaces the credential files the backend needs.
    #[must_use]
    pub fn with_auth_files(mut self, files: impl IntoIterator<Item = PathBuf>) -> Self {
        self.auth_files = files.into_iter().collect();
        self
    }

    /// Overrides the readiness probe.
    #[must_use]
    pub fn with_readiness(mut self, probe: ReadinessProbe) -> Self {
        self.readiness = Some(probe);
        self
    }

    /// Returns the service identity.
    #[must_use]
    pub const fn service(&self) -> ServiceKind {
        self.service
    }

    /// Returns the resolved run mode.
    #[must_use]
    pub const fn mode(&self) -> RunMode {
        self.mode
    }

    /// Returns the command to spawn.
    #[must_use]
    pub const fn command(&self) -> &LaunchCommand {
        &self.command
    }

    /// Returns the credential files required by the backend.
    #[must_use]
    pub fn auth_files(&self) -> &[PathBuf] {
        &self.auth_files
    }

    /// Returns the readiness probe, defaulting by mode: mocks announce
    /// themselves on stdout, real servers are probed with a handshake.
    #[must_use]
    pub fn readiness(&self) -> ReadinessProbe {
        match (&self.readiness, self.mode) {
            (Some(probe), _) => probe.clone(),
            (None, RunMode::Real) => ReadinessProbe::Handshake,
            (None, RunMode::Mock) => ReadinessProbe::FirstStdoutLine,
        }
    }
}
