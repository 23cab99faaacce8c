// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Error surface of stream sessions. Transport failures and remote result
// codes are folded into one taxonomy at `process_return`.

use crate::endpoint::EndpointError;
use crate::status::HalResult;

/// Errors returned by stream sessions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    /// The session or its channels were never established, or the endpoint is gone.
    #[error("stream not initialized")]
    NotInitialized,

    /// No signal from the peer within the wait bound.
    #[error("timed out waiting for the stream peer")]
    Timeout,

    #[error("operation not supported by the stream endpoint")]
    NotSupported,

    #[error("invalid arguments")]
    InvalidArguments,

    #[error("invalid state")]
    InvalidState,

    #[error("stream endpoint returned unknown result code {0}")]
    UnknownResult(i32),

    /// The RPC call itself failed, as opposed to returning an error result.
    #[error("transport failure: {0}")]
    TransportFailure(String),

    /// Negotiation succeeded but the channels could not be used.
    #[error("channel setup failed: {0}")]
    ChannelSetupFailure(String),

    #[error("read report inconsistent: ring held {ring} bytes, status reports {status}")]
    InconsistentRead { ring: usize, status: usize },

    #[error("event flag wait failed: {0}")]
    WaitFailed(String),
}

pub type Result<T> = std::result::Result<T, StreamError>;

impl From<HalResult> for StreamError {
    fn from(result: HalResult) -> Self {
        match result {
            HalResult::NotInitialized => StreamError::NotInitialized,
            HalResult::InvalidArguments => StreamError::InvalidArguments,
            HalResult::NotSupported => StreamError::NotSupported,
            HalResult::Unknown(code) => StreamError::UnknownResult(code),
            // An error path carrying OK means the peer is confused.
            HalResult::InvalidState | HalResult::Ok => StreamError::InvalidState,
        }
    }
}

impl From<EndpointError> for StreamError {
    fn from(err: EndpointError) -> Self {
        match err {
            EndpointError::Transport(msg) => StreamError::TransportFailure(msg),
            EndpointError::Remote(result) => result.into(),
        }
    }
}

/// Map an endpoint reply onto the stream error surface, logging failures
/// under the name of the operation.
pub(crate) fn process_return<T>(op: &str, reply: std::result::Result<T, EndpointError>) -> Result<T> {
    reply.map_err(|err| {
        match &err {
            EndpointError::Transport(msg) => tracing::error!(op, "transport failure: {msg}"),
            EndpointError::Remote(result) => tracing::debug!(op, ?result, "remote call failed"),
        }
        err.into()
    })
}

/// Map a result code read from a status record.
pub(crate) fn process_status(op: &str, result: HalResult) -> Result<()> {
    if result.is_ok() {
        return Ok(());
    }
    tracing::debug!(op, ?result, "status record reports failure");
    Err(result.into())
}
