//! Handler contract.
//!
//! A handler receives the request context, writes its own response through
//! it, and returns `Ok(())`. Returning an error without having written a
//! response lets the dispatcher answer with the error's status.

use std::future::Future;

use axum::http::StatusCode;
use futures_util::future::BoxFuture;
use thiserror::Error;

use crate::context::{ContextError, RequestContext};

pub type HandlerResult = Result<(), HandlerError>;

/// Errors a handler may return.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Context(#[from] ContextError),

    /// An explicit status chosen by the handler.
    #[error("{message}")]
    Status { status: StatusCode, message: String },

    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl HandlerError {
    pub fn status(status: StatusCode, message: impl Into<String>) -> Self {
        HandlerError::Status {
            status,
            message: message.into(),
        }
    }

    /// Status code the dispatcher answers with when the handler wrote nothing.
    pub fn status_code(&self) -> StatusCode {
        match self {
            HandlerError::Context(ContextError::Json(_)) => StatusCode::BAD_REQUEST,
            HandlerError::Context(_) => StatusCode::INTERNAL_SERVER_ERROR,
            HandlerError::Status { status, .. } => *status,
            HandlerError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// A request handler.
pub trait Handler: Send + Sync + 'static {
    fn call(&self, ctx: RequestContext) -> BoxFuture<'static, HandlerResult>;
}

impl<F, Fut> Handler for F
where
    F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, ctx: RequestContext) -> BoxFuture<'static, HandlerResult> {
        Box::pin(self(ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let bad_json = serde_json::from_slice::<u8>(b"{").unwrap_err();
        assert_eq!(
            HandlerError::from(ContextError::Json(bad_json)).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            HandlerError::status(StatusCode::NOT_FOUND, "no subject").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            HandlerError::from(ContextError::AlreadyWritten).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
