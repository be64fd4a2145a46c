//! Deadline-bearing cancellation tokens.
//!
//! # Responsibilities
//! - Carry the request's lifetime as a cancellation signal
//! - Derive child tokens with an added duration
//! - Report whether the token finished by expiry or by cancellation
//!
//! # Design Decisions
//! - No timer task is spawned; expiry is observed by sleeping inside `done()`
//! - Child deadline is the earlier of the parent's deadline and `now + duration`
//! - Cancelling a parent cancels every child; the reverse never happens
//! - Uses `tokio::time::Instant` so tests can drive the clock

use std::time::Duration;

use tokio::time::{self, Instant};
use tokio_util::sync::{CancellationToken, DropGuard};

/// Why a deadline token finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoneReason {
    /// The deadline elapsed.
    Expired,
    /// The token (or one of its parents) was cancelled.
    Cancelled,
}

impl DoneReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DoneReason::Expired => "expired",
            DoneReason::Cancelled => "cancelled",
        }
    }
}

/// A cancellation handle that may also carry a deadline.
///
/// Once `is_done()` returns true it keeps returning true: cancellation is
/// sticky and the clock never runs backwards.
#[derive(Debug, Clone)]
pub struct DeadlineToken {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl DeadlineToken {
    /// A token without a deadline, finished only by cancellation.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
        }
    }

    /// Wrap an existing cancellation token.
    pub fn from_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Derive a token that finishes after `duration`, or earlier if this
    /// token finishes first.
    ///
    /// A duration too large to represent as an instant adds no deadline of
    /// its own; the child keeps the parent's deadline, if any.
    pub fn child(&self, duration: Duration) -> Self {
        let candidate = Instant::now().checked_add(duration);
        let deadline = match (self.deadline, candidate) {
            (Some(parent), Some(candidate)) => Some(parent.min(candidate)),
            (parent, None) => parent,
            (None, candidate) => candidate,
        };

        Self {
            token: self.token.child_token(),
            deadline,
        }
    }

    /// The instant this token expires at, if it has one.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before expiry. `None` when the token has no deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Whether this token or one of its parents was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Whether the deadline has passed. Always false without a deadline.
    pub fn is_expired(&self) -> bool {
        self.deadline
            .map(|deadline| Instant::now() >= deadline)
            .unwrap_or(false)
    }

    pub fn is_done(&self) -> bool {
        self.reason().is_some()
    }

    /// Why the token is done, if it is. Cancellation takes precedence.
    pub fn reason(&self) -> Option<DoneReason> {
        if self.is_cancelled() {
            Some(DoneReason::Cancelled)
        } else if self.is_expired() {
            Some(DoneReason::Expired)
        } else {
            None
        }
    }

    /// Cancel this token and all tokens derived from it.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Cancel this token when the returned guard is dropped.
    pub fn cancel_on_drop(&self) -> DropGuard {
        self.token.clone().drop_guard()
    }

    /// Wait until the token expires or is cancelled.
    pub async fn done(&self) -> DoneReason {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.token.cancelled() => DoneReason::Cancelled,
                    _ = time::sleep_until(deadline) => DoneReason::Expired,
                }
            }
            None => {
                self.token.cancelled().await;
                DoneReason::Cancelled
            }
        }
    }
}

impl Default for DeadlineToken {
    fn default() -> Self {
        Self::new()
    }
}
