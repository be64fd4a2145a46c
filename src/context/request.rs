//! Per-request context handed to handlers.
//!
//! # Responsibilities
//! - Hold the request head and buffered body
//! - Expose query, form, path and JSON accessors
//! - Own the response sink and the request's deadline token
//!
//! # Design Decisions
//! - Cloning a context is cheap; clones share the request and the sink
//! - The deadline is per clone, so the supervised handler can see a
//!   narrower deadline than the dispatcher without a second sink
//! - Query/form lookups return the last value for a key

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    body::Bytes,
    http::{header, request::Parts, HeaderMap, HeaderValue, Method, StatusCode, Uri},
};
use serde::{de::DeserializeOwned, Serialize};
use tokio_util::sync::CancellationToken;

use crate::context::deadline::DeadlineToken;
use crate::context::error::ContextError;
use crate::context::sink::{ResponseSink, SharedSink, SinkGuard, TEXT_PLAIN};
use crate::http::request_id::X_REQUEST_ID;

const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

struct Shared {
    parts: Parts,
    body: Bytes,
    params: HashMap<String, String>,
    lifetime: CancellationToken,
    sink: SharedSink,
}

/// Everything a handler needs to read the request and answer it.
#[derive(Clone)]
pub struct RequestContext {
    shared: Arc<Shared>,
    deadline: DeadlineToken,
}

impl RequestContext {
    /// Build a context from a request head and its buffered body.
    pub fn new(parts: Parts, body: Bytes) -> Self {
        Self::with_params(parts, body, HashMap::new())
    }

    /// Build a context that also carries matched path parameters.
    pub fn with_params(parts: Parts, body: Bytes, params: HashMap<String, String>) -> Self {
        let lifetime = CancellationToken::new();
        let deadline = DeadlineToken::from_token(lifetime.child_token());

        Self {
            shared: Arc::new(Shared {
                parts,
                body,
                params,
                lifetime,
                sink: SharedSink::new(),
            }),
            deadline,
        }
    }

    /// A clone that shares this request and sink but observes `deadline`.
    pub fn with_deadline(&self, deadline: DeadlineToken) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            deadline,
        }
    }

    /// The deadline this clone runs under.
    ///
    /// Well-behaved long-running handlers select on `deadline().done()` and
    /// stop early once the request is finished.
    pub fn deadline(&self) -> &DeadlineToken {
        &self.deadline
    }

    /// Cancel the request's lifetime token and every deadline derived from it.
    pub fn cancel(&self) {
        self.shared.lifetime.cancel();
    }

    pub(crate) fn lifetime(&self) -> &CancellationToken {
        &self.shared.lifetime
    }

    /// Acquire the sink lock.
    pub fn lock_sink(&self) -> SinkGuard<'_> {
        self.shared.sink.lock()
    }

    /// Seal the sink and return the response to send.
    pub fn finish(&self) -> ResponseSink {
        self.lock_sink().seal()
    }

    // Request head

    /// HTTP method of the request.
    pub fn method(&self) -> &Method {
        &self.shared.parts.method
    }

    /// Request URI, including the query string.
    pub fn uri(&self) -> &Uri {
        &self.shared.parts.uri
    }

    /// Request headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.shared.parts.headers
    }

    /// The buffered request body.
    pub fn body(&self) -> &Bytes {
        &self.shared.body
    }

    /// The `x-request-id` assigned to this request, or `unknown`.
    pub fn request_id(&self) -> &str {
        self.headers()
            .get(X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown")
    }

    /// A matched path parameter, e.g. `id` for `/subject/{id}`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.shared.params.get(key).map(String::as_str)
    }

    // Query string

    /// Every query parameter with all of its values, in order.
    pub fn query_all(&self) -> HashMap<String, Vec<String>> {
        self.uri()
            .query()
            .map(|q| parse_pairs(q.as_bytes()))
            .unwrap_or_default()
    }

    /// All values of a query parameter, or `def` when absent.
    pub fn query_array(&self, key: &str, def: Vec<String>) -> Vec<String> {
        self.query_all().remove(key).unwrap_or(def)
    }

    /// Last value of a query parameter, or `def` when absent.
    pub fn query_string(&self, key: &str, def: &str) -> String {
        last_value(&self.query_all(), key).unwrap_or_else(|| def.to_string())
    }

    /// Last value of a query parameter as an integer, or `def` when absent
    /// or not numeric.
    pub fn query_int(&self, key: &str, def: i64) -> i64 {
        last_value(&self.query_all(), key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(def)
    }

    // Form body

    /// Decoded `application/x-www-form-urlencoded` body; empty for any other
    /// content type.
    pub fn form_all(&self) -> HashMap<String, Vec<String>> {
        let is_form = self
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.starts_with(FORM_URLENCODED))
            .unwrap_or(false);

        if is_form {
            parse_pairs(&self.shared.body)
        } else {
            HashMap::new()
        }
    }

    /// All values of a form field, or `def` when absent.
    pub fn form_array(&self, key: &str, def: Vec<String>) -> Vec<String> {
        self.form_all().remove(key).unwrap_or(def)
    }

    /// Last value of a form field, or `def` when absent.
    pub fn form_string(&self, key: &str, def: &str) -> String {
        last_value(&self.form_all(), key).unwrap_or_else(|| def.to_string())
    }

    /// Last value of a form field as an integer, or `def` when absent or
    /// not numeric.
    pub fn form_int(&self, key: &str, def: i64) -> i64 {
        last_value(&self.form_all(), key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(def)
    }

    /// Deserialize the JSON body. The body stays available afterwards.
    pub fn bind_json<T: DeserializeOwned>(&self) -> Result<T, ContextError> {
        serde_json::from_slice(&self.shared.body).map_err(ContextError::Json)
    }

    // Response

    /// Write a JSON response under the sink lock.
    pub fn json<T: Serialize + ?Sized>(&self, status: StatusCode, value: &T) -> Result<(), ContextError> {
        let body = serde_json::to_vec(value).map_err(ContextError::Encode)?;
        self.lock_sink()
            .write(status, HeaderValue::from_static("application/json"), body)
    }

    /// Write a plain-text response under the sink lock.
    pub fn text(&self, status: StatusCode, body: impl Into<String>) -> Result<(), ContextError> {
        let body: String = body.into();
        self.lock_sink()
            .write(status, HeaderValue::from_static(TEXT_PLAIN), body)
    }
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("method", self.method())
            .field("uri", self.uri())
            .field("deadline", &self.deadline)
            .finish()
    }
}

fn parse_pairs(input: &[u8]) -> HashMap<String, Vec<String>> {
    let mut map: HashMap<String, Vec<String>> = HashMap::new();
    for (key, value) in url::form_urlencoded::parse(input) {
        map.entry(key.into_owned()).or_default().push(value.into_owned());
    }
    map
}

fn last_value(map: &HashMap<String, Vec<String>>, key: &str) -> Option<String> {
    map.get(key).and_then(|values| values.last()).cloned()
}
