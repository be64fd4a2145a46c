//! Request context subsystem.
//!
//! # Data Flow
//! ```text
//! dispatcher
//!     → request.rs (RequestContext: head, body, params, lifetime token)
//!     → deadline.rs (DeadlineToken derived per supervised call)
//!     → sink.rs (ResponseSink behind the sink lock, timed-out flag)
//!     → dispatcher seals the sink and sends it
//! ```
//!
//! # Design Decisions
//! - One sink per request, shared by every clone of the context
//! - All writes, from handlers or the supervisor, take the sink lock
//! - Cancellation flows parent → child only

pub mod deadline;
pub mod error;
pub mod request;
pub mod sink;

pub use deadline::{DeadlineToken, DoneReason};
pub use error::ContextError;
pub use request::RequestContext;
pub use sink::{ResponseSink, SinkGuard};
