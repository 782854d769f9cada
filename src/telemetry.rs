//! Telemetry logic.
//! Support logging and metrics.
use std::sync::OnceLock;
use std::time::Instant;

use axum::extract::{MatchedPath, Request, State};
use axum::http::{StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use metrics::Unit;
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*, reload};

use crate::AppState;

static LOG_FILTER: OnceLock<reload::Handle<EnvFilter, Registry>> = OnceLock::new();

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` wins over `debug`.
pub fn setup_logging(debug: bool) -> Result<(), TryInitError> {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let (filter, handle) = reload::Layer::new(log_filter(debug, rust_log.as_deref()));
    let _ = LOG_FILTER.set(handle);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .try_init()
}

/// Switch the installed filter once the configuration is known.
pub fn apply_debug(debug: bool) {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    if let Some(handle) = LOG_FILTER.get() {
        if let Err(err) = handle.reload(log_filter(debug, rust_log.as_deref())) {
            tracing::warn!(error = %err, "cannot reload log filter");
        }
    }
}

fn log_filter(debug: bool, rust_log: Option<&str>) -> EnvFilter {
    let level = if debug { "debug" } else { "info" };
    rust_log
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(level))
}

/// Create recorder for Prometheus metrics.
pub fn setup_metrics_recorder() -> Result<PrometheusHandle, BuildError> {
    const EXPONENTIAL_SECONDS: &[f64] = &[
        0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
    ];

    metrics::describe_counter!(
        "http_requests_total",
        Unit::Count,
        "Total number of HTTP requests."
    );
    metrics::describe_histogram!(
        "http_requests_duration_seconds",
        Unit::Seconds,
        "HTTP request latency."
    );

    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("http_requests_duration_seconds".to_string()),
            EXPONENTIAL_SECONDS,
        )?
        .install_recorder()
}

/// Track every request: count and latency, labelled by route and status.
pub async fn track(req: Request, next: Next) -> impl IntoResponse {
    let start = Instant::now();
    let path = if let Some(matched_path) = req.extensions().get::<MatchedPath>() {
        matched_path.as_str().to_owned()
    } else {
        req.uri().path().to_owned()
    };
    let method = req.method().clone();

    let response = next.run(req).await;

    let latency = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    let labels = [
        ("method", method.to_string()),
        ("path", path),
        ("status", status),
    ];
    metrics::counter!("http_requests_total", &labels).increment(1);
    metrics::histogram!("http_requests_duration_seconds", &labels).record(latency);

    response
}

/// Prometheus exposition.
pub async fn render(State(state): State<AppState>) -> Response {
    match state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_filter() {
        assert_eq!(log_filter(false, None).to_string(), "info");
        assert_eq!(log_filter(true, None).to_string(), "debug");
        assert_eq!(log_filter(true, Some("warn")).to_string(), "warn");
        assert_eq!(log_filter(false, Some("twgate=trace")).to_string(), "twgate=trace");
    }
}
