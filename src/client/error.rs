//! Controller-side error types.

use thiserror::Error;

use crate::protocol::DbError;

/// Result type for controller operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur on the controller side of the protocol.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The transport rejected the outbound envelope.
    #[error("failed to send request to the worker")]
    SendFailed,

    /// The demux task is gone; the worker channel closed underneath us.
    #[error("response channel closed unexpectedly")]
    ChannelClosed,

    /// Request timed out waiting for its response.
    #[error("request timed out after {0} seconds")]
    Timeout(u64),

    /// Failed to serialize the request envelope.
    #[error("failed to serialize request: {0}")]
    SerializeFailed(#[source] serde_json::Error),

    /// The worker answered with an error response.
    #[error(transparent)]
    Remote(#[from] DbError),
}

impl ClientError {
    /// Check if this error is worth retrying on a fresh connection.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::ChannelClosed)
    }
}
