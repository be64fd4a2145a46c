//! Shared utilities for integration tests.

use std::fmt;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::{HeaderMap, Method, Request, StatusCode};
use axum::Router;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower::ServiceExt;
use tracing::field::{Field, Visit};
use tracing::subscriber::DefaultGuard;
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{self, Layer, SubscriberExt};

use deadline_web::{App, HandlerResult, RequestContext, Shutdown};

/// A response reduced to what the assertions look at.
#[allow(dead_code)]
pub struct Reply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

/// Drive one request through the router without a socket.
#[allow(dead_code)]
pub async fn call(router: &Router, method: Method, uri: &str, body: Body) -> Reply {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(body)
        .unwrap();

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();

    Reply {
        status,
        headers,
        body: String::from_utf8(bytes.to_vec()).unwrap(),
    }
}

#[allow(dead_code)]
pub async fn get(router: &Router, uri: &str) -> Reply {
    call(router, Method::GET, uri, Body::empty()).await
}

/// Serve `app` on an ephemeral port.
#[allow(dead_code)]
pub async fn start_server(app: App) -> (SocketAddr, Shutdown, JoinHandle<std::io::Result<()>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let handle = tokio::spawn(app.serve(listener, shutdown.subscribe()));
    (addr, shutdown, handle)
}

#[allow(dead_code)]
pub async fn ok_handler(ctx: RequestContext) -> HandlerResult {
    ctx.text(StatusCode::OK, "ok")?;
    Ok(())
}

#[allow(dead_code)]
pub async fn panicking_handler(_ctx: RequestContext) -> HandlerResult {
    panic!("handler blew up");
}

/// Events captured by [`capture_events`], rendered as `LEVEL message key=value..`.
#[allow(dead_code)]
pub type EventLog = Arc<Mutex<Vec<String>>>;

#[allow(dead_code)]
struct CaptureLayer {
    events: EventLog,
}

#[allow(dead_code)]
#[derive(Default)]
struct EventText {
    message: String,
    fields: Vec<String>,
}

impl Visit for EventText {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        } else {
            self.fields.push(format!("{}={:?}", field.name(), value));
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields.push(format!("{}={}", field.name(), value));
        }
    }
}

impl<S: Subscriber> Layer<S> for CaptureLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: layer::Context<'_, S>) {
        let mut text = EventText::default();
        event.record(&mut text);
        let line = format!(
            "{} {} {}",
            event.metadata().level(),
            text.message,
            text.fields.join(" ")
        );
        self.events.lock().unwrap().push(line);
    }
}

/// Capture tracing events on the current thread until the guard drops.
///
/// Use with a current-thread runtime so spawned handler tasks log into the
/// same subscriber.
#[allow(dead_code)]
pub fn capture_events() -> (EventLog, DefaultGuard) {
    let events = EventLog::default();
    let subscriber = tracing_subscriber::registry().with(CaptureLayer {
        events: events.clone(),
    });
    let guard = tracing::subscriber::set_default(subscriber);
    (events, guard)
}
