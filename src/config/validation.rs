//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (ports, intervals, status codes)
//! - Reject timeout overrides that can never match a method
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::IpAddr;
use std::time::Duration;

use crate::config::schema::GatewayConfig;
use crate::rpc::Code;

const MIN_RUNTIME_COLLECTION_INTERVAL: Duration = Duration::from_secs(1);

/// A single semantic problem in a configuration document.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let server = &config.server;
    let mut errors = Vec::new();

    if server.listener.address.parse::<IpAddr>().is_err() {
        errors.push(ValidationError::new(
            "server.listener.address",
            format!("{:?} is not an IP address", server.listener.address),
        ));
    }

    for (i, o) in server.timeouts.overrides.iter().enumerate() {
        if o.service.is_empty() || o.method.is_empty() {
            errors.push(ValidationError::new(
                format!("server.timeouts.overrides[{i}]"),
                "service and method must both be set",
            ));
        }
    }

    if let Some(access_log) = &server.access_log {
        for code in &access_log.status_code_filters {
            if Code::try_from_i32(*code).is_none() {
                errors.push(ValidationError::new(
                    "server.access_log.status_code_filters",
                    format!("unknown status code {code}"),
                ));
            }
        }
    }

    if server.stats.flush_interval_ms == 0 {
        errors.push(ValidationError::new(
            "server.stats.flush_interval_ms",
            "must be greater than zero",
        ));
    }

    if let Some(runtime) = &server.stats.runtime {
        if runtime.collection_interval() < MIN_RUNTIME_COLLECTION_INTERVAL {
            errors.push(ValidationError::new(
                "server.stats.runtime.collection_interval_ms",
                "must be at least one second",
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
