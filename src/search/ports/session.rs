//! Backend session ports used by the pipeline.

use crate::rpc::RpcResult;
use crate::service::domain::ServiceKind;
use crate::supervisor::domain::ProcessState;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Calls available on a live backend.
#[async_trait]
pub trait BackendSession: Send + Sync {
    /// Invokes a tool and returns its joined text output.
    async fn call_tool(&self, name: &str, arguments: Value) -> RpcResult<String>;

    /// Reads a resource as text.
    async fn read_resource(&self, uri: &str) -> RpcResult<String>;
}

/// Result of looking up a service's session.
#[derive(Clone)]
pub enum SessionLookup {
    /// The backend is running.
    Ready(Arc<dyn BackendSession>),
    /// The backend cannot take calls; carries its state if supervised.
    Unavailable(Option<ProcessState>),
}

impl std::fmt::Debug for SessionLookup {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ready(_) => formatter.write_str("Ready"),
            Self::Unavailable(state) => formatter.debug_tuple("Unavailable").field(state).finish(),
        }
    }
}

/// Source of sessions for the services a pipeline run touches.
pub trait SessionDirectory: Send + Sync {
    /// Returns the session for `service`, or why there is none.
    fn session(&self, service: ServiceKind) -> SessionLookup;
}
