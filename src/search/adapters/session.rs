//! Session ports backed by supervised RPC clients.

use crate::rpc::{RpcClient, RpcResult};
use crate::search::ports::{BackendSession, SessionDirectory, SessionLookup};
use crate::service::domain::ServiceKind;
use crate::supervisor::services::Supervisor;
use async_trait::async_trait;
use mockable::Clock;
use serde_json::Value;

#[async_trait]
impl BackendSession for RpcClient {
    async fn call_tool(&self, name: &str, arguments: Value) -> RpcResult<String> {
        let output = Self::call_tool(self, name, arguments).await?;
        Ok(output.text())
    }

    async fn read_resource(&self, uri: &str) -> RpcResult<String> {
        Self::read_resource(self, uri).await
    }
}

impl<C> SessionDirectory for Supervisor<C>
where
    C: Clock + Send + Sync + 'static,
{
    fn session(&self, service: ServiceKind) -> SessionLookup {
        self.client(service).map_or_else(
            || SessionLookup::Unavailable(self.status().get(&service).copied()),
            |client| SessionLookup::Ready(client),
        )
    }
}
