//! Fault boundary.
//!
//! # Responsibilities
//! - Run a handler future so that a panic is captured, not propagated
//! - Turn the panic payload into a loggable message
//!
//! # Design Decisions
//! - The boundary never touches the response sink; deciding what to send is
//!   the supervisor's job
//! - `AssertUnwindSafe` is sound here: state shared with the handler is the
//!   sink, whose mutex tolerates poisoning

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use thiserror::Error;

/// A panic captured while running a handler.
#[derive(Debug, Clone, Error)]
#[error("handler panicked: {message}")]
pub struct Fault {
    message: String,
}

impl Fault {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        Self::new(panic_message(payload.as_ref()))
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Poll `future` to completion, converting a panic into a [`Fault`].
pub async fn catch_fault<F>(future: F) -> Result<F::Output, Fault>
where
    F: Future,
{
    AssertUnwindSafe(future)
        .catch_unwind()
        .await
        .map_err(Fault::from_panic)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_passes_through_normal_output() {
        let out = catch_fault(async { 7 }).await;
        assert_eq!(out.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_captures_str_panic() {
        let fault = catch_fault(async { panic!("boom") }).await.unwrap_err();
        assert_eq!(fault.message(), "boom");
    }

    #[tokio::test]
    async fn test_captures_formatted_panic() {
        let id = 9;
        let fault = catch_fault(async move {
            if id > 0 {
                panic!("subject {} missing", id);
            }
        })
        .await
        .unwrap_err();
        assert_eq!(fault.message(), "subject 9 missing");
    }

    #[tokio::test]
    async fn test_captures_opaque_payload() {
        let fault = catch_fault(async { std::panic::panic_any(42u32) })
            .await
            .unwrap_err();
        assert_eq!(fault.message(), "unknown panic payload");
        assert_eq!(fault.to_string(), "handler panicked: unknown panic payload");
    }

    #[tokio::test]
    async fn test_panic_after_await_point() {
        let fault = catch_fault(async {
            tokio::task::yield_now().await;
            panic!("late");
        })
        .await
        .unwrap_err();
        assert_eq!(fault.message(), "late");
    }
}
