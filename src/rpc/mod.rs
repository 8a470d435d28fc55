//! Stdio JSON-RPC transport for MCP backends.
//!
//! Frames are newline-delimited JSON envelopes. [`RpcClient`] correlates
//! concurrent requests with their responses and layers the MCP handshake,
//! tool invocation and resource reads on top.

pub mod client;
pub mod codec;
pub mod envelope;
pub mod error;
pub mod mcp;

pub use client::{DEFAULT_CALL_TIMEOUT, RpcClient};
pub use envelope::{EnvelopeKind, ErrorObject, RequestId, RpcEnvelope};
pub use error::{FailureClass, RemoteError, RpcError, RpcResult};
pub use mcp::{ContentItem, ToolOutput};
