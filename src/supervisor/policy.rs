//! Responses committed by the supervisor on fault and timeout.

use axum::{
    body::Bytes,
    http::{HeaderValue, StatusCode},
};

use crate::config::ResponseConfig;
use crate::context::sink::TEXT_PLAIN;
use crate::context::SinkGuard;

/// A fixed status and body.
#[derive(Debug, Clone)]
pub struct CannedResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

impl CannedResponse {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Replace whatever the sink holds with this response.
    pub(crate) fn commit(&self, sink: &mut SinkGuard<'_>) {
        sink.replace(
            self.status,
            HeaderValue::from_static(TEXT_PLAIN),
            self.body.clone(),
        );
    }
}

/// What the caller sees when the handler faults or runs out of time.
#[derive(Debug, Clone)]
pub struct ResponsePolicy {
    pub fault: CannedResponse,
    pub timeout: CannedResponse,
}

impl Default for ResponsePolicy {
    fn default() -> Self {
        Self {
            fault: CannedResponse::new(StatusCode::INTERNAL_SERVER_ERROR, "panic"),
            timeout: CannedResponse::new(StatusCode::INTERNAL_SERVER_ERROR, "time out"),
        }
    }
}

impl ResponsePolicy {
    /// Build from validated config. Invalid status codes fall back to 500.
    pub fn from_config(config: &ResponseConfig) -> Self {
        let status = |code: u16| {
            StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
        };

        Self {
            fault: CannedResponse::new(status(config.fault_status), config.fault_body.clone()),
            timeout: CannedResponse::new(
                status(config.timeout_status),
                config.timeout_body.clone(),
            ),
        }
    }
}
