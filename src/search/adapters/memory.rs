//! In-memory session directory.

use crate::search::ports::{BackendSession, SessionDirectory, SessionLookup};
use crate::service::domain::ServiceKind;
use crate::supervisor::domain::ProcessState;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A fixed set of sessions, for embedding and tests.
#[derive(Debug, Clone, Default)]
pub struct InMemorySessionDirectory {
    sessions: BTreeMap<ServiceKind, SessionLookup>,
}

impl InMemorySessionDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a ready session for `service`.
    #[must_use]
    pub fn with_session(mut self, service: ServiceKind, session: Arc<dyn BackendSession>) -> Self {
        self.sessions.insert(service, SessionLookup::Ready(session));
        self
    }

    /// Marks `service` as unable to take calls.
    #[must_use]
    pub fn with_unavailable(mut self, service: ServiceKind, state: ProcessState) -> Self {
        self.sessions
            .insert(service, SessionLookup::Unavailable(Some(state)));
        self
    }
}

impl SessionDirectory for InMemorySessionDirectory {
    fn session(&self, service: ServiceKind) -> SessionLookup {
        self.sessions
            .get(&service)
            .cloned()
            .unwrap_or(SessionLookup::Unavailable(None))
    }
}
