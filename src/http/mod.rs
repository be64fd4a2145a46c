//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum router, trace + request ID layers)
//!     → request_id.rs (x-request-id assigned if missing)
//!     → server.rs dispatch (buffer body, build RequestContext)
//!     → handler.rs (Handler, possibly a TimeoutHandler)
//!     → sealed ResponseSink → Send to client
//! ```

pub mod handler;
pub mod request_id;
pub mod server;

pub use handler::{Handler, HandlerError, HandlerResult};
pub use request_id::{UuidRequestId, X_REQUEST_ID};
pub use server::{App, Group};
