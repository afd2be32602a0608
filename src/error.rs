// Admission errors are expected client outcomes, not system faults
use axum::{
    Json,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::models::ErrorBody;

/// Authentication gate rejection
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GateError {
    #[error("API key missing or invalid")]
    MissingOrInvalidCredential,
}

/// Outcome of a failed admission check
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AdmissionError {
    #[error(transparent)]
    Unauthorized(#[from] GateError),

    #[error("Rate limit exceeded")]
    RateLimited { retry_after: Duration },
}

impl AdmissionError {
    pub fn status(&self) -> StatusCode {
        match self {
            AdmissionError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AdmissionError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        }
    }

    // Whole seconds, rounded up, never zero
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            AdmissionError::RateLimited { retry_after } => Some(ceil_secs(*retry_after)),
            AdmissionError::Unauthorized(_) => None,
        }
    }
}

fn ceil_secs(d: Duration) -> u64 {
    let secs = d.as_secs() + u64::from(d.subsec_nanos() > 0);
    secs.max(1)
}

impl IntoResponse for AdmissionError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut body = ErrorBody::new(self.to_string());
        match self.retry_after_secs() {
            Some(secs) => {
                body.retry_after_seconds = Some(secs);
                (status, [(header::RETRY_AFTER, secs.to_string())], Json(body)).into_response()
            }
            None => (status, Json(body)).into_response(),
        }
    }
}

/// Calculator input problems, reported as 400
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CalcError {
    #[error("JSON body is required")]
    BodyRequired,

    #[error("Expecting JSON format")]
    NotJson,

    #[error("Missing keys: {}", .0.join(", "))]
    MissingKeys(Vec<&'static str>),

    #[error("Numbers must be numeric")]
    NotNumeric,

    #[error("Division by zero is not allowed")]
    DivisionByZero,
}

impl IntoResponse for CalcError {
    fn into_response(self) -> Response {
        (StatusCode::BAD_REQUEST, Json(ErrorBody::new(self.to_string()))).into_response()
    }
}

/// Policy / startup configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid limit '{limit}': {reason}")]
    InvalidLimit { limit: String, reason: String },

    #[error("rule '{0}' has a zero-length window")]
    ZeroWindow(String),

    #[error("rule '{0}' allows zero requests")]
    ZeroCount(String),

    #[error("rule name '{0}' is used more than once")]
    DuplicateRule(String),

    #[error("failed to read policy file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse policy file: {0}")]
    Parse(#[from] serde_json::Error),
}
