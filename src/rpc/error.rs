//! Error types for the stdio RPC transport.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Result type for RPC client operations.
pub type RpcResult<T> = Result<T, RpcError>;

/// Error reported by the remote side of a call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("remote error {code}: {message}")]
pub struct RemoteError {
    /// Backend-supplied error code.
    pub code: i64,
    /// Backend-supplied message.
    pub message: String,
}

impl RemoteError {
    /// Creates a remote error.
    #[must_use]
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Errors returned by [`super::RpcClient`] operations.
#[derive(Debug, Clone, Error)]
pub enum RpcError {
    /// The transport closed before a response arrived.
    #[error("transport closed")]
    TransportClosed,

    /// No response arrived within the call timeout.
    #[error("{method} timed out after {after:?}")]
    Timeout {
        /// Remote procedure that timed out.
        method: String,
        /// Elapsed timeout.
        after: Duration,
    },

    /// The remote side answered with an error.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// A resource read returned neither inline text nor decodable content.
    #[error("invalid resource payload: {0}")]
    InvalidResourcePayload(String),

    /// A tool call returned a result that is not a tool output object.
    #[error("invalid tool payload: {0}")]
    InvalidToolPayload(String),

    /// Reading or writing the transport failed.
    #[error("transport I/O error: {0}")]
    Io(Arc<std::io::Error>),

    /// An outgoing envelope could not be encoded.
    #[error("failed to encode frame: {0}")]
    Encode(Arc<serde_json::Error>),

    /// An outgoing envelope encoded to more bytes than a frame may hold.
    #[error("outgoing frame of {length} bytes exceeds the {max} byte limit")]
    FrameTooLarge {
        /// Encoded length of the request.
        length: usize,
        /// Frame limit.
        max: usize,
    },
}

/// Retry-relevant classification of an [`RpcError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// The backend is throttling; retrying immediately worsens it.
    RateLimited,
    /// A retry may succeed.
    Transient,
    /// Retrying cannot help.
    Permanent,
}

const RATE_LIMIT_STATUS: i64 = 429;

impl RpcError {
    /// Wraps an I/O failure.
    #[must_use]
    pub fn io(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::BrokenPipe {
            return Self::TransportClosed;
        }
        Self::Io(Arc::new(err))
    }

    /// Classifies the error for retry decisions.
    #[must_use]
    pub fn failure_class(&self) -> FailureClass {
        match self {
            Self::Remote(remote) if is_rate_limit(remote) => FailureClass::RateLimited,
            Self::Remote(remote) if (500..=599).contains(&remote.code) => FailureClass::Transient,
            Self::Timeout { .. } | Self::TransportClosed | Self::Io(_) => FailureClass::Transient,
            Self::Remote(_)
            | Self::InvalidResourcePayload(_)
            | Self::InvalidToolPayload(_)
            | Self::Encode(_)
            | Self::FrameTooLarge { .. } => FailureClass::Permanent,
        }
    }

    /// Returns whether the backend reported throttling.
    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        self.failure_class() == FailureClass::RateLimited
    }
}

fn is_rate_limit(remote: &RemoteError) -> bool {
    if remote.code == RATE_LIMIT_STATUS {
        return true;
    }
    let message = remote.message.to_ascii_lowercase();
    message.contains("rate limit") || (message.contains("429") && message.contains("rate"))
}
