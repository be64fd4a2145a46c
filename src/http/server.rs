//! HTTP server setup and dispatch.
//!
//! # Responsibilities
//! - Register handlers by method and path, with prefix groups
//! - Build the Axum router and wire up middleware (tracing, request ID)
//! - Buffer the body, build the RequestContext and run the handler
//! - Turn the sealed response sink into the HTTP response
//! - Serve with graceful shutdown

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{FromRequestParts, Path},
    http::{HeaderValue, Method, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::{MethodFilter, MethodRouter},
    Router,
};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::config::FrameworkConfig;
use crate::context::sink::TEXT_PLAIN;
use crate::context::RequestContext;
use crate::http::handler::Handler;
use crate::http::request_id::UuidRequestId;
use crate::lifecycle::shutdown;
use crate::observability::metrics;
use crate::supervisor::{catch_fault, ResponsePolicy, TimeoutHandler};

struct Route {
    method: Method,
    path: String,
    handler: Arc<dyn Handler>,
}

/// Route table plus the settings every request is dispatched with.
pub struct App {
    config: FrameworkConfig,
    policy: Arc<ResponsePolicy>,
    routes: Vec<Route>,
}

impl App {
    /// An empty route table using `config` for limits, deadlines and responses.
    pub fn new(config: FrameworkConfig) -> Self {
        let policy = Arc::new(ResponsePolicy::from_config(&config.responses));
        Self {
            config,
            policy,
            routes: Vec::new(),
        }
    }

    /// The configuration this app was built with.
    pub fn config(&self) -> &FrameworkConfig {
        &self.config
    }

    /// Fault and timeout responses shared by every bounded handler.
    pub fn policy(&self) -> Arc<ResponsePolicy> {
        Arc::clone(&self.policy)
    }

    /// Register `handler` for `method` and `path`. Registering the same
    /// method and path again replaces the earlier handler.
    pub fn route<H: Handler>(&mut self, method: Method, path: &str, handler: H) -> &mut Self {
        let path = join_path("", path);
        self.routes.retain(|r| !(r.method == method && r.path == path));
        self.routes.push(Route {
            method,
            path,
            handler: Arc::new(handler),
        });
        self
    }

    pub fn get<H: Handler>(&mut self, path: &str, handler: H) -> &mut Self {
        self.route(Method::GET, path, handler)
    }

    pub fn post<H: Handler>(&mut self, path: &str, handler: H) -> &mut Self {
        self.route(Method::POST, path, handler)
    }

    pub fn put<H: Handler>(&mut self, path: &str, handler: H) -> &mut Self {
        self.route(Method::PUT, path, handler)
    }

    pub fn delete<H: Handler>(&mut self, path: &str, handler: H) -> &mut Self {
        self.route(Method::DELETE, path, handler)
    }

    pub fn patch<H: Handler>(&mut self, path: &str, handler: H) -> &mut Self {
        self.route(Method::PATCH, path, handler)
    }

    /// Routes registered under a common path prefix.
    pub fn group(&mut self, prefix: &str) -> Group<'_> {
        Group {
            app: self,
            prefix: join_path("", prefix),
        }
    }

    /// Bound `handler` by the configured default deadline.
    pub fn timeout<H: Handler>(&self, handler: H) -> TimeoutHandler {
        self.timeout_for(handler, self.config.timeouts.handler())
    }

    /// Bound `handler` by an explicit deadline.
    pub fn timeout_for<H: Handler>(&self, handler: H, duration: Duration) -> TimeoutHandler {
        TimeoutHandler::new(Arc::new(handler), duration).with_policy(self.policy())
    }

    /// Build the Axum router with all middleware layers.
    pub fn into_router(self) -> Router {
        let body_limit = self.config.listener.max_body_bytes;
        let mut by_path: BTreeMap<String, MethodRouter> = BTreeMap::new();

        for route in self.routes {
            let filter = match MethodFilter::try_from(route.method.clone()) {
                Ok(filter) => filter,
                Err(_) => {
                    tracing::warn!(method = %route.method, path = %route.path, "Unsupported method, route skipped");
                    continue;
                }
            };

            let handler = route.handler;
            let policy = Arc::clone(&self.policy);
            let endpoint = move |request: Request<Body>| {
                let handler = Arc::clone(&handler);
                let policy = Arc::clone(&policy);
                async move { dispatch(handler, request, body_limit, &policy).await }
            };

            let methods = by_path.remove(&route.path).unwrap_or_else(MethodRouter::new);
            by_path.insert(route.path, methods.on(filter, endpoint));
        }

        let router = by_path
            .into_iter()
            .fold(Router::new(), |router, (path, methods)| router.route(&path, methods));

        router.layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
    }

    /// Run the server on `listener` until `shutdown` fires.
    pub async fn serve(
        self,
        listener: TcpListener,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            routes = self.routes.len(),
            "HTTP server starting"
        );

        let router = self.into_router();
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown::wait(shutdown_rx))
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// A view of an [`App`] that prefixes every registered path.
pub struct Group<'a> {
    app: &'a mut App,
    prefix: String,
}

impl Group<'_> {
    pub fn route<H: Handler>(&mut self, method: Method, path: &str, handler: H) -> &mut Self {
        let full = join_path(&self.prefix, path);
        self.app.route(method, &full, handler);
        self
    }

    pub fn get<H: Handler>(&mut self, path: &str, handler: H) -> &mut Self {
        self.route(Method::GET, path, handler)
    }

    pub fn post<H: Handler>(&mut self, path: &str, handler: H) -> &mut Self {
        self.route(Method::POST, path, handler)
    }

    pub fn put<H: Handler>(&mut self, path: &str, handler: H) -> &mut Self {
        self.route(Method::PUT, path, handler)
    }

    pub fn delete<H: Handler>(&mut self, path: &str, handler: H) -> &mut Self {
        self.route(Method::DELETE, path, handler)
    }

    pub fn patch<H: Handler>(&mut self, path: &str, handler: H) -> &mut Self {
        self.route(Method::PATCH, path, handler)
    }

    pub fn group(&mut self, prefix: &str) -> Group<'_> {
        Group {
            prefix: join_path(&self.prefix, prefix),
            app: &mut *self.app,
        }
    }

    pub fn timeout<H: Handler>(&self, handler: H) -> TimeoutHandler {
        self.app.timeout(handler)
    }

    pub fn timeout_for<H: Handler>(&self, handler: H, duration: Duration) -> TimeoutHandler {
        self.app.timeout_for(handler, duration)
    }
}

/// Per-request entry point behind every registered route.
async fn dispatch(
    handler: Arc<dyn Handler>,
    request: Request<Body>,
    body_limit: usize,
    policy: &ResponsePolicy,
) -> Response {
    let started = Instant::now();
    let method = request.method().clone();
    let (mut parts, body) = request.into_parts();

    let params = match Path::<HashMap<String, String>>::from_request_parts(&mut parts, &()).await {
        Ok(Path(params)) => params,
        Err(_) => HashMap::new(),
    };

    let body = match Limited::new(body, body_limit).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            let (status, message) = if e.is::<LengthLimitError>() {
                (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large")
            } else {
                (StatusCode::BAD_REQUEST, "Failed to read request body")
            };
            tracing::warn!(error = %e, limit = body_limit, status = status.as_u16(), "Failed to buffer request body");
            metrics::record_request(method.as_str(), status.as_u16(), started);
            return (status, message).into_response();
        }
    };

    let ctx = RequestContext::with_params(parts, body, params);
    // Dropping this future (client gone) or finishing the request cancels
    // every deadline derived from the request.
    let _lifetime = ctx.lifetime().clone().drop_guard();

    let call_ctx = ctx.clone();
    match catch_fault(async move { handler.call(call_ctx).await }).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            tracing::warn!(request_id = %ctx.request_id(), error = %err, "Handler returned error");
            let mut sink = ctx.lock_sink();
            if !sink.is_written() && !sink.has_timed_out() {
                sink.replace(
                    err.status_code(),
                    HeaderValue::from_static(TEXT_PLAIN),
                    err.to_string(),
                );
            }
        }
        Err(fault) => {
            tracing::error!(request_id = %ctx.request_id(), fault = %fault.message(), "Handler panicked");
            let mut sink = ctx.lock_sink();
            policy.fault.commit(&mut sink);
        }
    }

    let sent = ctx.finish();
    tracing::debug!(
        request_id = %ctx.request_id(),
        method = %method,
        status = sent.status().as_u16(),
        "Request finished"
    );
    metrics::record_request(method.as_str(), sent.status().as_u16(), started);
    sent.into_response()
}

/// Join a group prefix and a route path into an axum path.
///
/// Colon-style captures (`/:id`, `/*rest`) are rewritten to axum's brace
/// syntax (`/{id}`, `/{*rest}`), which axum 0.8 requires.
fn join_path(prefix: &str, path: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    let path = path.trim_start_matches('/');

    let joined = match (prefix.is_empty(), path.is_empty()) {
        (true, true) => return "/".to_string(),
        (false, true) => prefix.to_string(),
        (true, false) => format!("/{}", path),
        (false, false) => format!("{}/{}", prefix, path),
    };

    joined
        .split('/')
        .map(|segment| {
            if let Some(name) = segment.strip_prefix(':').filter(|n| !n.is_empty()) {
                format!("{{{}}}", name)
            } else if let Some(name) = segment.strip_prefix('*').filter(|n| !n.is_empty()) {
                format!("{{*{}}}", name)
            } else {
                segment.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}
