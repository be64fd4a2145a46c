//! Bounded-execution supervisor.
//!
//! # Data Flow
//! ```text
//! TimeoutHandler::call
//!     → timeout.rs (derive deadline, spawn task, three-way race)
//!     → fault.rs (panic → Fault inside the spawned task)
//!     → policy.rs (fault / timeout response committed through the sink lock)
//! ```
//!
//! # Design Decisions
//! - One supervisor per request, one spawned task per supervised call
//! - Exactly one outcome is committed; which one under exact simultaneity
//!   is unspecified
//! - Timeouts need no cooperation from the handler

pub mod fault;
pub mod policy;
pub mod timeout;

pub use fault::{catch_fault, Fault};
pub use policy::{CannedResponse, ResponsePolicy};
pub use timeout::{supervise, timeout_handler, TimeoutHandler};

use crate::http::handler::HandlerResult;

/// Terminal state of one supervised call.
#[derive(Debug)]
pub enum Outcome {
    /// The handler returned; it wrote its own response.
    Success(HandlerResult),
    /// The handler panicked; the fault response was committed.
    Fault(Fault),
    /// The deadline fired first; the timeout response was committed.
    TimedOut,
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Success(_) => "success",
            Outcome::Fault(_) => "fault",
            Outcome::TimedOut => "timeout",
        }
    }
}
