//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! dispatcher, supervisor, abandoned handler tasks
//!     → logging.rs (structured log events keyed by request_id)
//!     → metrics.rs (counters, histograms)
//! ```
//!
//! # Design Decisions
//! - Request ID flows through every supervisor event
//! - Abandoned handlers are counted so the leak is visible

pub mod logging;
pub mod metrics;
