use axum::{extract::State, http::StatusCode};
use prometheus::{Encoder, TextEncoder};
use std::sync::Arc;
use tracing::error;

use crate::metrics::WINDOW_COUNTERS;
use crate::state::AppState;

pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> Result<String, StatusCode> {
    WINDOW_COUNTERS.set(state.admission.tracked_counters() as f64);

    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).map_err(|e| {
        error!(error = %e, "failed to encode metrics");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    String::from_utf8(buffer).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}
