//! Request timing middleware.

use axum::{body::Body, extract::State, http::Request, middleware::Next, response::Response};
use std::time::Instant;

use crate::http::server::AppState;

/// Record the latency of every API request as `agent.http.request`.
pub async fn request_metrics_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let start = Instant::now();
    let response = next.run(request).await;
    state.telemetry.measure_since("agent.http.request", start);
    response
}
