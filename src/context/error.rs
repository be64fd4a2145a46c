//! Errors raised by request accessors and response writes.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContextError {
    /// The request body could not be decoded as JSON.
    #[error("invalid JSON body: {0}")]
    Json(#[source] serde_json::Error),

    /// A response payload could not be encoded.
    #[error("failed to encode response: {0}")]
    Encode(#[source] serde_json::Error),

    /// The handler tried to write a second response.
    #[error("response already written")]
    AlreadyWritten,
}
