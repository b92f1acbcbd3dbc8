//! HTTP status endpoint
//!
//! - `GET /metrics` - counters in Prometheus text format
//! - `GET /health` - liveness
//! - `GET /session` - JSON snapshot of the coordinator's observable state
//!
//! Uses hyper for the HTTP server.

use crate::infra::metrics::{
    Metrics, MetricsSummary, SUBMIT_BUCKET_BOUNDS, SUBMIT_NUM_BUCKETS,
};
use crate::services::coordinator::CoordinatorState;
use bytes::Bytes;
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::fmt::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

fn write_counter(output: &mut String, name: &str, help: &str, val: u64) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} counter");
    let _ = writeln!(output, "{name} {val}");
}

fn write_gauge(output: &mut String, name: &str, help: &str, val: f64) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} gauge");
    let _ = writeln!(output, "{name} {val}");
}

/// Write a histogram metric with buckets, sum, and count
fn write_histogram(
    output: &mut String,
    name: &str,
    help: &str,
    buckets: &[u64; SUBMIT_NUM_BUCKETS],
    sum: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} histogram");

    let mut cumulative = 0u64;
    for (i, &bound) in SUBMIT_BUCKET_BOUNDS.iter().enumerate() {
        cumulative += buckets[i];
        let _ = writeln!(output, "{name}_bucket{{le=\"{bound}\"}} {cumulative}");
    }
    cumulative += buckets[SUBMIT_NUM_BUCKETS - 1];
    let _ = writeln!(output, "{name}_bucket{{le=\"+Inf\"}} {cumulative}");
    let _ = writeln!(output, "{name}_sum {sum}");
    let _ = writeln!(output, "{name}_count {cumulative}");
}

/// Format metrics in Prometheus text exposition format
fn format_prometheus_metrics(summary: &MetricsSummary, state: &CoordinatorState) -> String {
    let mut output = String::with_capacity(2048);

    write_counter(&mut output, "checkin_scans_valid_total", "Valid scans", summary.scans_valid);
    write_counter(
        &mut output,
        "checkin_scans_invalid_total",
        "Scans that failed validation",
        summary.scans_invalid,
    );
    write_counter(
        &mut output,
        "checkin_sessions_started_total",
        "Sessions started",
        summary.sessions_started,
    );
    write_counter(
        &mut output,
        "checkin_sessions_ended_total",
        "Sessions ended",
        summary.sessions_ended,
    );
    write_counter(&mut output, "checkin_ticks_total", "Timer ticks emitted", summary.ticks_total);
    write_counter(
        &mut output,
        "checkin_observer_ticks_dropped_total",
        "Ticks dropped for a slow observer",
        summary.observer_ticks_dropped,
    );
    write_counter(
        &mut output,
        "checkin_broadcasts_dropped_total",
        "Cross-process broadcasts dropped",
        summary.broadcasts_dropped,
    );
    write_counter(
        &mut output,
        "checkin_submissions_succeeded_total",
        "Submissions that reached the server",
        summary.submissions_succeeded,
    );
    write_counter(
        &mut output,
        "checkin_submissions_failed_total",
        "Submissions that failed",
        summary.submissions_failed,
    );
    write_histogram(
        &mut output,
        "checkin_submit_latency_ms",
        "Submission latency in milliseconds",
        &summary.submit_lat_buckets,
        summary.submit_lat_sum_ms,
    );
    write_gauge(
        &mut output,
        "checkin_session_active",
        "1 if a location is held and the session has not ended",
        if state.current_location.is_some() && !state.session_ended { 1.0 } else { 0.0 },
    );
    write_gauge(
        &mut output,
        "checkin_timer_bound",
        "1 if the timer process is running",
        if state.process_bound { 1.0 } else { 0.0 },
    );

    output
}

fn text_response(status: StatusCode, content_type: &str, body: String) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    if let Ok(value) = hyper::header::HeaderValue::from_str(content_type) {
        response.headers_mut().insert(hyper::header::CONTENT_TYPE, value);
    }
    response
}

async fn handle_request(
    req: Request<hyper::body::Incoming>,
    metrics: Arc<Metrics>,
    state: watch::Receiver<CoordinatorState>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let response = match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => {
            let snapshot = state.borrow().clone();
            let body = format_prometheus_metrics(&metrics.snapshot(), &snapshot);
            text_response(StatusCode::OK, "text/plain; version=0.0.4; charset=utf-8", body)
        }
        (&Method::GET, "/health") => {
            text_response(StatusCode::OK, "text/plain", "ok".to_string())
        }
        (&Method::GET, "/session") => {
            let snapshot = state.borrow().clone();
            match serde_json::to_string(&snapshot) {
                Ok(body) => text_response(StatusCode::OK, "application/json", body),
                Err(e) => text_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "text/plain",
                    e.to_string(),
                ),
            }
        }
        _ => text_response(StatusCode::NOT_FOUND, "text/plain", "not found".to_string()),
    };
    Ok(response)
}

/// Bind the status server on `port` and serve until shutdown
pub async fn start_status_server(
    port: u16,
    metrics: Arc<Metrics>,
    state: watch::Receiver<CoordinatorState>,
    shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    serve(listener, metrics, state, shutdown).await
}

/// Serve requests on an already bound listener
pub async fn serve(
    listener: TcpListener,
    metrics: Arc<Metrics>,
    state: watch::Receiver<CoordinatorState>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    info!(addr = %listener.local_addr()?, "status_server_started");

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let metrics = metrics.clone();
                        let state = state.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                let metrics = metrics.clone();
                                let state = state.clone();
                                async move { handle_request(req, metrics, state).await }
                            });

                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                error!(error = %e, "status_http_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "status_accept_error");
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("status_server_shutdown");
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::LocationRecord;

    #[test]
    fn test_format_prometheus_metrics() {
        let metrics = Metrics::new();
        metrics.record_scan(true);
        metrics.record_scan(false);
        metrics.record_submission(true, 120);
        metrics.record_submission(false, 40_000);

        let state = CoordinatorState {
            current_location: Some(LocationRecord::new("80 Feet Rd", "Lib-1234", 5.5)),
            process_bound: true,
            ..Default::default()
        };
        let output = format_prometheus_metrics(&metrics.snapshot(), &state);

        assert!(output.contains("checkin_scans_valid_total 1"));
        assert!(output.contains("checkin_scans_invalid_total 1"));
        assert!(output.contains("checkin_submit_latency_ms_bucket{le=\"250\"} 1"));
        assert!(output.contains("checkin_submit_latency_ms_bucket{le=\"+Inf\"} 2"));
        assert!(output.contains("checkin_submit_latency_ms_sum 40120"));
        assert!(output.contains("checkin_session_active 1"));
        assert!(output.contains("checkin_timer_bound 1"));
    }
}
