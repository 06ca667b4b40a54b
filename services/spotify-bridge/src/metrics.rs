//! Prometheus metrics exposition
//!
//! - `bridge_requests_total` (counter): labels `route`, `status`
//! - `bridge_request_duration_seconds` (histogram): label `route`
//! - `bridge_token_refreshes_total` (counter, from the session): label `outcome`
//! - `bridge_upstream_retries_total` (counter, from the session): label `cause`

use std::time::Instant;

use axum::extract::{MatchedPath, Request};
use axum::middleware::Next;
use axum::response::Response;
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};

/// Histogram buckets cover a fast cached call up to a rate-limited retry.
const DURATION_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
];

fn builder() -> Result<PrometheusBuilder, BuildError> {
    PrometheusBuilder::new().set_buckets_for_metric(
        Matcher::Full("bridge_request_duration_seconds".to_string()),
        DURATION_BUCKETS,
    )
}

/// Install the global Prometheus recorder and return its render handle.
pub fn install_recorder() -> anyhow::Result<PrometheusHandle> {
    Ok(builder()?.install_recorder()?)
}

/// Handle backed by a recorder that is not installed globally (tests).
#[cfg(test)]
pub fn detached_handle() -> PrometheusHandle {
    builder().unwrap().build_recorder().handle()
}

/// Record a completed request.
pub fn record_request(route: &str, status: u16, duration_secs: f64) {
    metrics::counter!(
        "bridge_requests_total",
        "route" => route.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("bridge_request_duration_seconds", "route" => route.to_string())
        .record(duration_secs);
}

/// Middleware recording every routed request under its route template.
pub async fn track_requests(request: Request, next: Next) -> Response {
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let started = Instant::now();

    let response = next.run(request).await;
    record_request(
        &route,
        response.status().as_u16(),
        started.elapsed().as_secs_f64(),
    );
    response
}
