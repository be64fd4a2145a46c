//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, addresses parse, statuses valid)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: FrameworkConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use axum::http::StatusCode;
use thiserror::Error;

use crate::config::schema::FrameworkConfig;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: invalid socket address {value:?}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{field}: must be greater than zero")]
    Zero { field: &'static str },

    #[error("{field}: {code} is not a valid HTTP status")]
    InvalidStatus { field: &'static str, code: u16 },

    #[error("{field}: {code} is not an error status (4xx or 5xx)")]
    NotAnError { field: &'static str, code: u16 },

    #[error("observability.log_level: unknown level {0:?}")]
    UnknownLogLevel(String),
}

pub fn validate_config(config: &FrameworkConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address(&mut errors, "listener.bind_address", &config.listener.bind_address);
    if config.listener.max_body_bytes == 0 {
        errors.push(ValidationError::Zero { field: "listener.max_body_bytes" });
    }

    if config.timeouts.handler_ms == 0 {
        errors.push(ValidationError::Zero { field: "timeouts.handler_ms" });
    }

    check_status(&mut errors, "responses.fault_status", config.responses.fault_status);
    check_status(&mut errors, "responses.timeout_status", config.responses.timeout_status);

    let level = config.observability.log_level.to_ascii_lowercase();
    if !matches!(level.as_str(), "trace" | "debug" | "info" | "warn" | "error") {
        errors.push(ValidationError::UnknownLogLevel(config.observability.log_level.clone()));
    }
    if config.observability.metrics_enabled {
        check_address(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}

fn check_status(errors: &mut Vec<ValidationError>, field: &'static str, code: u16) {
    match StatusCode::from_u16(code) {
        Ok(status) if status.is_client_error() || status.is_server_error() => {}
        Ok(_) => errors.push(ValidationError::NotAnError { field, code }),
        Err(_) => errors.push(ValidationError::InvalidStatus { field, code }),
    }
}
