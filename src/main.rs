//! deadline-web demo server.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ axum router ──▶ dispatch ──▶ RequestContext
//!                     (trace,          │
//!                      request ID)     ▼
//!                              ┌──────────────────┐
//!                              │ TimeoutHandler   │── spawn ──▶ handler task
//!                              │   select! {      │            (fault boundary)
//!                              │     fault,       │◀── try_send ──┘
//!                              │     completion,  │
//!                              │     deadline }   │
//!                              └────────┬─────────┘
//!                                       ▼
//!     Client Response ◀──── sealed ResponseSink (exactly one outcome)
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use axum::http::StatusCode;
use clap::Parser;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

use deadline_web::config::{load_config, FrameworkConfig};
use deadline_web::lifecycle::{signals, Shutdown};
use deadline_web::observability::{logging, metrics};
use deadline_web::{App, HandlerError, HandlerResult, RequestContext};

#[derive(Parser)]
#[command(name = "deadline-web")]
#[command(about = "HTTP server with deadline-bounded handlers", long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener bind address.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => FrameworkConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }

    logging::init(&config.observability);
    tracing::info!("deadline-web v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        handler_timeout_ms = config.timeouts.handler_ms,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let mut app = App::new(config);
    register_routes(&mut app);

    let shutdown = Shutdown::new();
    let server = tokio::spawn(app.serve(listener, shutdown.subscribe()));

    signals::shutdown_on_signal(&shutdown).await;
    server.await??;

    tracing::info!("Shutdown complete");
    Ok(())
}

fn register_routes(app: &mut App) {
    app.post("/user/login", user_login);
    let bounded_login = app.timeout_for(user_login, Duration::from_secs(1));
    app.get("/user/login", bounded_login);

    let mut subjects = app.group("/subject");
    subjects.post("/add", subject_add);
    subjects.get("/list/all", subject_list);
    subjects.get("/{id}", subject_get);
    subjects.put("/{id}", subject_update);
    subjects.delete("/{id}", subject_delete);

    let slow = app.timeout(slow_report);
    app.get("/slow", slow);
    let faulty = app.timeout(faulty_report);
    app.get("/panic", faulty);
}

async fn user_login(ctx: RequestContext) -> HandlerResult {
    ctx.json(StatusCode::OK, "ok, UserLoginController")?;
    Ok(())
}

#[derive(Debug, Deserialize, Serialize)]
struct Subject {
    name: String,
}

async fn subject_add(ctx: RequestContext) -> HandlerResult {
    let subject: Subject = ctx.bind_json()?;
    ctx.json(StatusCode::CREATED, &subject)?;
    Ok(())
}

async fn subject_list(ctx: RequestContext) -> HandlerResult {
    let limit = ctx.query_int("limit", 10);
    ctx.json(StatusCode::OK, &format!("ok, SubjectListController limit={}", limit))?;
    Ok(())
}

fn subject_id(ctx: &RequestContext) -> Result<u64, HandlerError> {
    ctx.param("id")
        .and_then(|id| id.parse().ok())
        .ok_or_else(|| HandlerError::status(StatusCode::BAD_REQUEST, "subject id must be numeric"))
}

async fn subject_get(ctx: RequestContext) -> HandlerResult {
    let id = subject_id(&ctx)?;
    ctx.json(StatusCode::OK, &format!("ok, SubjectGetController id={}", id))?;
    Ok(())
}

async fn subject_update(ctx: RequestContext) -> HandlerResult {
    let id = subject_id(&ctx)?;
    ctx.json(StatusCode::OK, &format!("ok, SubjectUpdateController id={}", id))?;
    Ok(())
}

async fn subject_delete(ctx: RequestContext) -> HandlerResult {
    let id = subject_id(&ctx)?;
    ctx.json(StatusCode::OK, &format!("ok, SubjectDelController id={}", id))?;
    Ok(())
}

/// Takes longer than any sane deadline; stops early if asked to.
async fn slow_report(ctx: RequestContext) -> HandlerResult {
    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(10)) => {
            ctx.json(StatusCode::OK, "ok")?;
        }
        reason = ctx.deadline().done() => {
            tracing::info!(reason = reason.as_str(), "Slow report stopped early");
        }
    }
    Ok(())
}

async fn faulty_report(_ctx: RequestContext) -> HandlerResult {
    panic!("report generator crashed");
}
