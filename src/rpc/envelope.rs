//! JSON-RPC envelope exchanged with backend processes.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

/// Protocol version tag written on every outgoing envelope.
pub const JSONRPC_VERSION: &str = "2.0";

/// Correlation identifier shared by a request and its response.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Numeric identifier, as allocated by [`super::RpcClient`].
    Number(u64),
    /// String identifier used by some servers.
    Text(String),
}

impl From<u64> for RequestId {
    fn from(value: u64) -> Self {
        Self::Number(value)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(value) => write!(formatter, "{value}"),
            Self::Text(value) => formatter.write_str(value),
        }
    }
}

/// Error object carried by an error response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    /// Backend-supplied error code.
    pub code: i64,
    /// Backend-supplied message.
    pub message: String,
    /// Optional structured detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ErrorObject {
    /// Creates an error object without structured detail.
    #[must_use]
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }
}

/// Shape of a decoded envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeKind {
    /// Carries `id` and `method`; a response is expected.
    Request,
    /// Carries `method` but no `id`.
    Notification,
    /// Carries `id` and `result`.
    Response,
    /// Carries `error` and usually an `id`.
    ErrorResponse,
    /// Matches none of the above.
    Invalid,
}

/// A single JSON-RPC message.
///
/// `result` distinguishes an absent member from an explicit `null`, so a
/// procedure that legitimately returns `null` still classifies as a
/// [`EnvelopeKind::Response`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcEnvelope {
    /// Protocol version tag.
    #[serde(default = "default_version")]
    pub jsonrpc: String,
    /// Correlation identifier; absent for notifications.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,
    /// Remote procedure name for requests and notifications.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Procedure parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    /// Successful result.
    #[serde(
        default,
        deserialize_with = "present_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub result: Option<Value>,
    /// Failure detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorObject>,
}

fn default_version() -> String {
    JSONRPC_VERSION.to_owned()
}

fn present_value<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl RpcEnvelope {
    fn empty() -> Self {
        Self {
            jsonrpc: default_version(),
            id: None,
            method: None,
            params: None,
            result: None,
            error: None,
        }
    }

    /// Builds a request expecting a response.
    #[must_use]
    pub fn request(id: RequestId, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            id: Some(id),
            method: Some(method.into()),
            params,
            ..Self::empty()
        }
    }

    /// Builds a notification; no response is expected.
    #[must_use]
    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            method: Some(method.into()),
            params,
            ..Self::empty()
        }
    }

    /// Builds a successful response.
    #[must_use]
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            id: Some(id),
            result: Some(result),
            ..Self::empty()
        }
    }

    /// Builds an error response.
    #[must_use]
    pub fn failure(id: Option<RequestId>, error: ErrorObject) -> Self {
        Self {
            id,
            error: Some(error),
            ..Self::empty()
        }
    }

    /// Classifies the envelope by the members it carries.
    #[must_use]
    pub const fn kind(&self) -> EnvelopeKind {
        match (&self.id, &self.method, &self.result, &self.error) {
            (Some(_), Some(_), None, None) => EnvelopeKind::Request,
            (None, Some(_), None, None) => EnvelopeKind::Notification,
            (Some(_), None, Some(_), None) => EnvelopeKind::Response,
            (_, None, None, Some(_)) => EnvelopeKind::ErrorResponse,
            _ => EnvelopeKind::Invalid,
        }
    }
}
