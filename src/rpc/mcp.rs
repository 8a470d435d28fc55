//! MCP payload shapes layered on the generic RPC client.

use super::error::{RemoteError, RpcError, RpcResult};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// MCP protocol revision announced during the handshake.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Handshake procedure.
pub const INITIALIZE: &str = "initialize";
/// Tool invocation procedure.
pub const TOOLS_CALL: &str = "tools/call";
/// Resource read procedure.
pub const RESOURCES_READ: &str = "resources/read";

/// Code used when a tool reports `isError: true`.
pub const TOOL_ERROR_CODE: i64 = -32000;
/// Code for unknown procedures.
pub const METHOD_NOT_FOUND: i64 = -32601;

/// Client name announced during the handshake.
pub const CLIENT_NAME: &str = "workspace-finder";

/// Builds `initialize` parameters.
#[must_use]
pub fn initialize_params() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {},
        "clientInfo": {
            "name": CLIENT_NAME,
            "version": env!("CARGO_PKG_VERSION"),
        },
    })
}

/// Builds `tools/call` parameters.
#[must_use]
pub fn tool_call_params(name: &str, arguments: Value) -> Value {
    json!({ "name": name, "arguments": arguments })
}

/// One item of tool output content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentItem {
    /// Inline text.
    Text {
        /// Text body.
        text: String,
    },
    /// Images, embedded resources and other kinds the finder ignores.
    #[serde(other)]
    Other,
}

/// Result of a `tools/call` request.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ToolOutput {
    /// Content items in server order.
    #[serde(default)]
    pub content: Vec<ContentItem>,
    /// Whether the tool reported failure.
    #[serde(default, rename = "isError")]
    pub is_error: bool,
}

impl ToolOutput {
    /// Creates a successful single-text output.
    #[must_use]
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentItem::Text { text: text.into() }],
            is_error: false,
        }
    }

    /// Joins every text item with newlines.
    #[must_use]
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|item| match item {
                ContentItem::Text { text } => Some(text.as_str()),
                ContentItem::Other => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Decodes a `tools/call` result, turning `isError` outputs into
/// [`RemoteError`]s.
///
/// # Errors
///
/// Returns [`RpcError::InvalidToolPayload`] for results that are not tool
/// output objects and [`RpcError::Remote`] when the tool reported failure.
pub fn parse_tool_output(result: Value) -> RpcResult<ToolOutput> {
    let output: ToolOutput = serde_json::from_value(result)
        .map_err(|err| RpcError::InvalidToolPayload(err.to_string()))?;
    if output.is_error {
        return Err(RemoteError::new(TOOL_ERROR_CODE, output.text()).into());
    }
    Ok(output)
}

/// Normalises a `resources/read` result to text.
///
/// The first content item wins: inline `text` is returned as-is, otherwise
/// `blob` is base64-decoded and must be UTF-8.
///
/// # Errors
///
/// Returns [`RpcError::InvalidResourcePayload`] for any other shape.
pub fn resource_text(result: &Value) -> RpcResult<String> {
    let first = result
        .get("contents")
        .and_then(Value::as_array)
        .and_then(|contents| contents.first())
        .ok_or_else(|| RpcError::InvalidResourcePayload("missing contents".to_owned()))?;

    if let Some(text) = first.get("text").and_then(Value::as_str) {
        return Ok(text.to_owned());
    }

    let blob = first
        .get("blob")
        .and_then(Value::as_str)
        .ok_or_else(|| RpcError::InvalidResourcePayload("neither text nor blob".to_owned()))?;
    let bytes = STANDARD
        .decode(blob)
        .map_err(|err| RpcError::InvalidResourcePayload(format!("blob is not base64: {err}")))?;
    String::from_utf8(bytes)
        .map_err(|err| RpcError::InvalidResourcePayload(format!("blob is not UTF-8: {err}")))
}
