//! Request envelopes and wire-level failures shared by all collaborators.

use telemetry::{HttpHeaders, RpcMetadata};
use thiserror::Error;

/// An RPC call: metadata travels next to the typed body.
#[derive(Debug, Clone)]
pub struct RpcRequest<T> {
    pub metadata: RpcMetadata,
    pub body: T,
}

impl<T> RpcRequest<T> {
    pub fn new(metadata: RpcMetadata, body: T) -> Self {
        Self { metadata, body }
    }

    /// A request without metadata.
    pub fn bare(body: T) -> Self {
        Self::new(RpcMetadata::new(), body)
    }
}

/// An HTTP call: headers travel next to the typed body.
#[derive(Debug, Clone)]
pub struct HttpRequest<T> {
    pub headers: HttpHeaders,
    pub body: T,
}

impl<T> HttpRequest<T> {
    pub fn new(headers: HttpHeaders, body: T) -> Self {
        Self { headers, body }
    }
}

/// A failure reaching or talking to a collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The collaborator could not be reached (connection refused, DNS, ...).
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),

    /// The call did not finish before its deadline.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// The caller gave up on the call.
    #[error("call cancelled")]
    Cancelled,

    /// The collaborator answered with a non-success status.
    #[error("status {code}: {message}")]
    Status { code: u16, message: String },

    /// The response was missing required fields or held invalid values.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The outgoing payload could not be encoded.
    #[error("failed to encode request: {0}")]
    Encode(String),
}

impl TransportError {
    pub fn status(code: u16, message: impl Into<String>) -> Self {
        TransportError::Status {
            code,
            message: message.into(),
        }
    }

    pub fn invalid_response(reason: impl Into<String>) -> Self {
        TransportError::InvalidResponse(reason.into())
    }
}
