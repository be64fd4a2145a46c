//! Bounded execution of a handler.
//!
//! # Protocol
//! ```text
//! supervise()
//!     → derive deadline (ctx deadline ∩ now + duration), cancel on return
//!     → spawn task: catch_fault(handler) → try_send(completion | fault)
//!     → select! { fault, completion, deadline }   first ready wins
//!         fault      → lock sink, log, commit fault response    → Fault
//!         completion → nothing to write                         → Success
//!         deadline   → lock sink, commit timeout, set_timed_out → TimedOut
//! ```
//!
//! # Design Decisions
//! - Signals are capacity-1 channels written with `try_send`, so the task
//!   never blocks on a supervisor that has already returned
//! - The losing task is abandoned, not aborted. It is told to stop through
//!   its deadline token; handlers that ignore the token run to completion
//!   and their late writes are dropped by the sink guard
//! - Tie-break between simultaneous signals is `select!`'s random choice

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::Instant;
use tracing::Instrument;

use crate::context::RequestContext;
use crate::http::handler::{Handler, HandlerResult};
use crate::observability::metrics;
use crate::supervisor::fault::{catch_fault, Fault};
use crate::supervisor::policy::ResponsePolicy;
use crate::supervisor::Outcome;

/// Run `handler` against `ctx` for at most `duration`.
///
/// Exactly one outcome is committed to the context's sink: the handler's own
/// response, the fault response, or the timeout response.
pub async fn supervise(
    handler: Arc<dyn Handler>,
    ctx: RequestContext,
    duration: Duration,
    policy: &ResponsePolicy,
) -> Outcome {
    let started = Instant::now();
    let deadline = ctx.deadline().child(duration);
    let _release = deadline.cancel_on_drop();

    let (done_tx, mut done_rx) = mpsc::channel::<HandlerResult>(1);
    let (fault_tx, mut fault_rx) = mpsc::channel::<Fault>(1);

    let span = tracing::debug_span!("handler", request_id = %ctx.request_id());
    tokio::spawn(
        run_guarded(handler, ctx.with_deadline(deadline.clone()), done_tx, fault_tx)
            .instrument(span),
    );

    let outcome = tokio::select! {
        Some(fault) = fault_rx.recv() => {
            let mut sink = ctx.lock_sink();
            tracing::error!(
                request_id = %ctx.request_id(),
                fault = %fault.message(),
                "Handler panicked"
            );
            policy.fault.commit(&mut sink);
            Outcome::Fault(fault)
        }
        Some(result) = done_rx.recv() => Outcome::Success(result),
        reason = deadline.done() => {
            let mut sink = ctx.lock_sink();
            policy.timeout.commit(&mut sink);
            sink.set_timed_out();
            drop(sink);

            tracing::warn!(
                request_id = %ctx.request_id(),
                reason = reason.as_str(),
                timeout_ms = duration.as_millis() as u64,
                "Handler exceeded deadline; abandoning task"
            );
            metrics::record_abandoned(reason.as_str());
            Outcome::TimedOut
        }
    };

    tracing::debug!(
        request_id = %ctx.request_id(),
        outcome = outcome.label(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Supervised call finished"
    );
    metrics::record_outcome(outcome.label(), started);
    outcome
}

/// Body of the spawned task: run the handler inside the fault boundary and
/// report without ever blocking.
async fn run_guarded(
    handler: Arc<dyn Handler>,
    ctx: RequestContext,
    done: mpsc::Sender<HandlerResult>,
    fault: mpsc::Sender<Fault>,
) {
    // The call itself happens inside the boundary so a panic while building
    // the future is caught too.
    match catch_fault(async move { handler.call(ctx).await }).await {
        Ok(result) => {
            if let Err(err) = done.try_send(result) {
                report_dropped("completion", &err);
            }
        }
        Err(captured) => {
            if let Err(err) = fault.try_send(captured) {
                report_dropped("fault", &err);
            }
        }
    }
}

fn report_dropped<T>(signal: &'static str, err: &TrySendError<T>) {
    let why = match err {
        TrySendError::Full(_) => "slot full",
        TrySendError::Closed(_) => "supervisor returned",
    };
    tracing::debug!(signal, why, "Dropped late signal from abandoned handler");
    metrics::record_late_signal(signal);
}

/// A handler wrapped in the supervisor protocol.
///
/// Produced by [`timeout_handler`]; usable anywhere a [`Handler`] is.
#[derive(Clone)]
pub struct TimeoutHandler {
    inner: Arc<dyn Handler>,
    duration: Duration,
    policy: Arc<ResponsePolicy>,
}

impl TimeoutHandler {
    /// Bound `inner` by `duration` with the default fault and timeout responses.
    pub fn new(inner: Arc<dyn Handler>, duration: Duration) -> Self {
        Self {
            inner,
            duration,
            policy: Arc::new(ResponsePolicy::default()),
        }
    }

    /// Use `policy` for the fault and timeout responses.
    pub fn with_policy(mut self, policy: Arc<ResponsePolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// The deadline applied to each call.
    pub fn duration(&self) -> Duration {
        self.duration
    }
}

impl Handler for TimeoutHandler {
    fn call(&self, ctx: RequestContext) -> BoxFuture<'static, HandlerResult> {
        let inner = Arc::clone(&self.inner);
        let policy = Arc::clone(&self.policy);
        let duration = self.duration;

        Box::pin(async move {
            match supervise(inner, ctx, duration, &policy).await {
                Outcome::Success(result) => result,
                // The response is already committed.
                Outcome::Fault(_) | Outcome::TimedOut => Ok(()),
            }
        })
    }
}

/// Wrap `handler` so it runs for at most `duration`.
pub fn timeout_handler<H: Handler>(handler: H, duration: Duration) -> TimeoutHandler {
    TimeoutHandler::new(Arc::new(handler), duration)
}
