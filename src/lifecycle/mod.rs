//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Validate → Init logging/metrics → Register routes → Serve
//!
//! Shutdown:
//!     signals.rs (SIGINT/SIGTERM) → shutdown.rs (broadcast) → server drains
//! ```
//!
//! # Design Decisions
//! - Server stops accepting first, in-flight requests finish
//! - Abandoned handler tasks are not awaited on shutdown

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
