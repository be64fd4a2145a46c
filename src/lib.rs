//! Minimal HTTP request-handling layer with bounded handler execution.

pub mod config;
pub mod context;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod supervisor;

pub use config::FrameworkConfig;
pub use context::RequestContext;
pub use http::{App, Handler, HandlerError, HandlerResult};
pub use lifecycle::Shutdown;
pub use supervisor::{timeout_handler, Outcome, TimeoutHandler};
