//! Supervised routes driven through the router.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Method, StatusCode};
use tokio::time::Instant;

use deadline_web::config::FrameworkConfig;
use deadline_web::{App, HandlerError, HandlerResult, RequestContext};

mod common;

async fn sleepy_handler(ctx: RequestContext) -> HandlerResult {
    tokio::time::sleep(Duration::from_secs(10)).await;
    ctx.json(StatusCode::OK, "ok")?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_fast_handler_response_passes_through() {
    let mut app = App::new(FrameworkConfig::default());
    let bounded = app.timeout_for(common::ok_handler, Duration::from_secs(1));
    app.get("/ok", bounded);
    let router = app.into_router();

    let start = Instant::now();
    let reply = common::get(&router, "/ok").await;

    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body, "ok");
    assert!(start.elapsed() < Duration::from_millis(50));
}

#[tokio::test(start_paused = true)]
async fn test_slow_handler_gets_timeout_after_deadline_not_handler_duration() {
    let mut app = App::new(FrameworkConfig::default());
    let bounded = app.timeout_for(sleepy_handler, Duration::from_secs(1));
    app.get("/slow", bounded);
    let router = app.into_router();

    let start = Instant::now();
    let reply = common::get(&router, "/slow").await;

    assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(reply.body, "time out");
    assert!(start.elapsed() >= Duration::from_secs(1));
    assert!(start.elapsed() < Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn test_late_write_after_timeout_is_noop() {
    let observed: Arc<Mutex<Option<(usize, String)>>> = Arc::new(Mutex::new(None));
    let slot = observed.clone();
    let handler = move |ctx: RequestContext| {
        let slot = slot.clone();
        async move {
            tokio::time::sleep(Duration::from_secs(10)).await;
            let write = ctx.text(StatusCode::OK, "too late");
            let sink = ctx.lock_sink();
            *slot.lock().unwrap() = Some((
                sink.sink().write_count(),
                String::from_utf8_lossy(sink.sink().body()).into_owned(),
            ));
            drop(sink);
            write.map_err(HandlerError::from)
        }
    };

    let mut app = App::new(FrameworkConfig::default());
    let bounded = app.timeout_for(handler, Duration::from_secs(1));
    app.get("/late", bounded);
    let router = app.into_router();

    let reply = common::get(&router, "/late").await;
    assert_eq!(reply.body, "time out");

    // Let the abandoned task wake up and try its write.
    tokio::time::sleep(Duration::from_secs(20)).await;
    let (writes, body) = observed.lock().unwrap().clone().expect("abandoned handler finished");
    assert_eq!(writes, 1);
    assert_eq!(body, "time out");
}

#[tokio::test(start_paused = true)]
async fn test_panic_is_contained_and_server_keeps_serving() {
    let mut app = App::new(FrameworkConfig::default());
    let faulty = app.timeout(common::panicking_handler);
    let fine = app.timeout(common::ok_handler);
    app.get("/panic", faulty).get("/ok", fine);
    let router = app.into_router();

    let start = Instant::now();
    let reply = common::get(&router, "/panic").await;
    assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(reply.body, "panic");
    assert!(start.elapsed() < Duration::from_millis(50));

    for _ in 0..3 {
        let reply = common::get(&router, "/ok").await;
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.body, "ok");
    }
}

#[tokio::test]
async fn test_unbounded_route_panic_is_contained() {
    let mut app = App::new(FrameworkConfig::default());
    app.get("/panic", common::panicking_handler);
    let router = app.into_router();

    let reply = common::get(&router, "/panic").await;
    assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(reply.body, "panic");
}

#[tokio::test(start_paused = true)]
async fn test_configured_policy_is_used() {
    let mut config = FrameworkConfig::default();
    config.timeouts.handler_ms = 200;
    config.responses.timeout_status = 504;
    config.responses.timeout_body = "deadline exceeded".into();
    config.responses.fault_status = 502;
    config.responses.fault_body = "handler fault".into();

    let mut app = App::new(config);
    let slow = app.timeout(sleepy_handler);
    let faulty = app.timeout(common::panicking_handler);
    app.get("/slow", slow).get("/panic", faulty);
    let router = app.into_router();

    let start = Instant::now();
    let reply = common::get(&router, "/slow").await;
    assert_eq!(reply.status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(reply.body, "deadline exceeded");
    assert!(start.elapsed() < Duration::from_millis(300));

    let reply = common::get(&router, "/panic").await;
    assert_eq!(reply.status, StatusCode::BAD_GATEWAY);
    assert_eq!(reply.body, "handler fault");
}

#[tokio::test]
async fn test_handler_error_becomes_response() {
    async fn missing(ctx: RequestContext) -> HandlerResult {
        let id = ctx.param("id").unwrap_or_default().to_string();
        Err(HandlerError::status(StatusCode::NOT_FOUND, format!("no subject {}", id)))
    }

    async fn writes_then_fails(ctx: RequestContext) -> HandlerResult {
        ctx.text(StatusCode::ACCEPTED, "queued")?;
        Err(HandlerError::status(StatusCode::CONFLICT, "ignored"))
    }

    let mut app = App::new(FrameworkConfig::default());
    let bounded = app.timeout(missing);
    app.group("/subject").get("/{id}", bounded).post("/{id}", writes_then_fails);
    let router = app.into_router();

    let reply = common::get(&router, "/subject/12").await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    assert_eq!(reply.body, "no subject 12");

    // A response already written wins over the returned error.
    let reply = common::call(&router, Method::POST, "/subject/12", Body::empty()).await;
    assert_eq!(reply.status, StatusCode::ACCEPTED);
    assert_eq!(reply.body, "queued");
}

#[tokio::test]
async fn test_bad_json_maps_to_bad_request() {
    #[derive(serde::Deserialize)]
    struct Login {
        #[allow(dead_code)]
        user: String,
    }

    async fn login(ctx: RequestContext) -> HandlerResult {
        let _login: Login = ctx.bind_json()?;
        ctx.json(StatusCode::OK, "ok")?;
        Ok(())
    }

    let mut app = App::new(FrameworkConfig::default());
    app.post("/user/login", login);
    let router = app.into_router();

    let reply = common::call(&router, Method::POST, "/user/login", Body::from("{not json")).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);

    let reply = common::call(&router, Method::POST, "/user/login", Body::from(r#"{"user":"ann"}"#)).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body, r#""ok""#);
    assert_eq!(reply.headers.get(header::CONTENT_TYPE).unwrap(), "application/json");
}

#[tokio::test]
async fn test_request_id_is_assigned_and_echoed() {
    async fn echo_id(ctx: RequestContext) -> HandlerResult {
        ctx.text(StatusCode::OK, ctx.request_id().to_string())?;
        Ok(())
    }

    let mut app = App::new(FrameworkConfig::default());
    app.get("/id", echo_id);
    let router = app.into_router();

    let reply = common::get(&router, "/id").await;
    let header = reply.headers.get("x-request-id").unwrap().to_str().unwrap();
    assert_eq!(header, reply.body);
    assert!(uuid::Uuid::parse_str(header).is_ok());
}

#[tokio::test]
async fn test_oversized_body_rejected() {
    let mut config = FrameworkConfig::default();
    config.listener.max_body_bytes = 8;
    let mut app = App::new(config);
    app.post("/upload", common::ok_handler);
    let router = app.into_router();

    let reply = common::call(&router, Method::POST, "/upload", Body::from("0123456789abcdef")).await;
    assert_eq!(reply.status, StatusCode::PAYLOAD_TOO_LARGE);

    let reply = common::call(&router, Method::POST, "/upload", Body::from("small")).await;
    assert_eq!(reply.status, StatusCode::OK);
}

#[tokio::test]
async fn test_query_and_form_accessors_through_dispatch() {
    async fn summary(ctx: RequestContext) -> HandlerResult {
        let page = ctx.query_int("page", 1);
        let user = ctx.form_string("user", "anonymous");
        ctx.text(StatusCode::OK, format!("{}:{}", user, page))?;
        Ok(())
    }

    let mut app = App::new(FrameworkConfig::default());
    app.post("/summary", summary);
    let router = app.into_router();

    let request = axum::http::Request::builder()
        .method(Method::POST)
        .uri("/summary?page=4")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from("user=lee"))
        .unwrap();
    let response = tower::ServiceExt::oneshot(router, request).await.unwrap();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(body.as_ref(), b"lee:4");
}

#[tokio::test]
async fn test_fault_is_logged_with_message() {
    let (events, _guard) = common::capture_events();

    let mut app = App::new(FrameworkConfig::default());
    let faulty = app.timeout(common::panicking_handler);
    app.get("/panic", faulty).get("/raw-panic", common::panicking_handler);
    let router = app.into_router();

    let reply = common::get(&router, "/panic").await;
    assert_eq!(reply.body, "panic");
    let reply = common::get(&router, "/raw-panic").await;
    assert_eq!(reply.body, "panic");

    let logged: Vec<String> = events
        .lock()
        .unwrap()
        .iter()
        .filter(|line| line.starts_with("ERROR Handler panicked"))
        .cloned()
        .collect();
    assert_eq!(logged.len(), 2, "{:?}", logged);
    assert!(logged.iter().all(|line| line.contains("fault=handler blew up")));
}

#[tokio::test]
async fn test_unbounded_duration_runs_handler() {
    let mut app = App::new(FrameworkConfig::default());
    let bounded = app.timeout_for(common::ok_handler, Duration::MAX);
    app.get("/x", bounded);
    let router = app.into_router();

    let reply = common::get(&router, "/x").await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body, "ok");
}

#[tokio::test]
async fn test_broken_body_stream_is_bad_request() {
    let chunks: Vec<Result<&'static str, std::io::Error>> = vec![
        Ok("user="),
        Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "peer went away")),
    ];
    let body = Body::from_stream(futures_util::stream::iter(chunks));

    let mut app = App::new(FrameworkConfig::default());
    app.post("/upload", common::ok_handler);
    let router = app.into_router();

    let reply = common::call(&router, Method::POST, "/upload", body).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
}
