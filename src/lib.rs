pub mod admission;
pub mod config;
pub mod error;
pub mod gate;
pub mod handlers;
pub mod identity;
pub mod metrics;
pub mod models;
pub mod rate_limit;
pub mod state;
pub mod sweeper;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::admission::enforce;
use crate::handlers::{
    add_handler, div_handler, health_handler, home_handler, metrics_handler, mul_handler,
    sub_handler,
};
use crate::state::AppState;

// Every route passes through admission before its handler runs
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(home_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/add", post(add_handler))
        .route("/sub", post(sub_handler))
        .route("/mul", post(mul_handler))
        .route("/div", post(div_handler))
        .route_layer(middleware::from_fn_with_state(Arc::clone(&state), enforce))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
