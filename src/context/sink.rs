//! Response sink and its write guard.
//!
//! # Responsibilities
//! - Buffer the single response a request produces
//! - Serialize writes from the handler task and the supervisor
//! - Suppress handler writes once a timeout response has been committed
//!
//! # Design Decisions
//! - The timed-out flag lives inside the same mutex as the sink, so it can
//!   only be read or set while the lock is held
//! - Handler writes are write-once; a second write is rejected instead of
//!   appending to the body
//! - Supervisor commits replace whatever the handler staged, since nothing
//!   reaches the wire before the dispatcher seals the sink
//! - Writes after sealing are silent no-ops

use std::sync::{Mutex, MutexGuard, PoisonError};

use axum::{
    body::{Body, Bytes},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};

use crate::context::error::ContextError;

pub(crate) const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

/// The buffered response of one request.
#[derive(Debug, Clone)]
pub struct ResponseSink {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
    written: bool,
    writes: usize,
}

impl ResponseSink {
    fn new() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            written: false,
            writes: 0,
        }
    }

    /// Status of the staged response; 200 until something is written.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Headers of the staged response.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Body of the staged response.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Whether any response has been staged.
    pub fn is_written(&self) -> bool {
        self.written
    }

    /// Number of writes that actually reached the sink.
    pub fn write_count(&self) -> usize {
        self.writes
    }

    fn set(&mut self, status: StatusCode, content_type: HeaderValue, body: Bytes) {
        self.status = status;
        self.headers.clear();
        self.headers.insert(header::CONTENT_TYPE, content_type);
        self.body = body;
        self.written = true;
        self.writes += 1;
    }
}

impl IntoResponse for ResponseSink {
    fn into_response(self) -> Response {
        (self.status, self.headers, Body::from(self.body)).into_response()
    }
}

#[derive(Debug)]
pub(crate) struct SinkState {
    sink: ResponseSink,
    timed_out: bool,
    sealed: bool,
}

/// Mutex-protected sink shared by everything that may answer a request.
#[derive(Debug)]
pub(crate) struct SharedSink {
    state: Mutex<SinkState>,
}

impl SharedSink {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(SinkState {
                sink: ResponseSink::new(),
                timed_out: false,
                sealed: false,
            }),
        }
    }

    /// Acquire the sink lock.
    ///
    /// A handler that panicked while holding the guard poisons the mutex; the
    /// state is still consistent (every mutation is a single `set`), so the
    /// poison is cleared rather than propagated.
    pub(crate) fn lock(&self) -> SinkGuard<'_> {
        SinkGuard {
            state: self.state.lock().unwrap_or_else(PoisonError::into_inner),
        }
    }
}

/// Exclusive access to a request's response sink.
///
/// Holding a `SinkGuard` is holding the sink lock. Do not call the
/// `RequestContext` write helpers while holding one; the lock is not
/// reentrant.
pub struct SinkGuard<'a> {
    state: MutexGuard<'a, SinkState>,
}

impl SinkGuard<'_> {
    /// Whether the supervisor committed a timeout response.
    pub fn has_timed_out(&self) -> bool {
        self.state.timed_out
    }

    /// Mark the request as timed out. Only the supervisor calls this, right
    /// after committing the timeout response.
    pub fn set_timed_out(&mut self) {
        self.state.timed_out = true;
    }

    /// Whether the response has been handed to the server.
    pub fn is_sealed(&self) -> bool {
        self.state.sealed
    }

    /// Whether any response has been staged.
    pub fn is_written(&self) -> bool {
        self.state.sink.is_written()
    }

    /// Read-only view of the staged response.
    pub fn sink(&self) -> &ResponseSink {
        &self.state.sink
    }

    /// Stage the handler's response.
    ///
    /// A no-op returning `Ok(())` when the request already timed out or the
    /// response has been sent.
    pub fn write(
        &mut self,
        status: StatusCode,
        content_type: HeaderValue,
        body: impl Into<Bytes>,
    ) -> Result<(), ContextError> {
        if self.state.timed_out || self.state.sealed {
            tracing::debug!(%status, "Suppressed write to finalized response");
            return Ok(());
        }
        if self.state.sink.is_written() {
            return Err(ContextError::AlreadyWritten);
        }

        self.state.sink.set(status, content_type, body.into());
        Ok(())
    }

    /// Commit a response on behalf of the supervisor, discarding anything
    /// the handler staged. Ignored once sealed.
    pub fn replace(&mut self, status: StatusCode, content_type: HeaderValue, body: impl Into<Bytes>) {
        if self.state.sealed {
            return;
        }
        self.state.sink.set(status, content_type, body.into());
    }

    /// Seal the sink and hand out its contents. Every later write is dropped.
    pub(crate) fn seal(&mut self) -> ResponseSink {
        self.state.sealed = true;
        self.state.sink.clone()
    }
}
