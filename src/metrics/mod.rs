use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::Duration;
use anyhow::{Context, Result};
use hyper::service::{make_service_fn, service_fn};
use hyper::{header, Body, Request, Response, Server, StatusCode};
use once_cell::sync::Lazy;
use prometheus::{
    register_histogram, register_histogram_vec, register_int_counter_vec, register_int_gauge,
    Encoder, Histogram, HistogramVec, IntCounterVec, IntGauge, TextEncoder,
};
use tracing::{error, info};

use crate::discovery::Latency;

static DIRECTORY_SYNCS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "nerf_directory_syncs_total",
        "Directory rebuilds by outcome",
        &["outcome"]
    )
    .expect("metric can be registered")
});

static DIRECTORY_TEAMS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "nerf_directory_teams",
        "Number of teams in the directory cache"
    )
    .expect("metric can be registered")
});

static DIRECTORY_SYNC_DURATION: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "nerf_directory_sync_duration_seconds",
        "Time spent rebuilding the directory cache",
        vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]
    )
    .expect("metric can be registered")
});

static PROBE_LATENCY: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "nerf_endpoint_probe_latency_seconds",
        "Round-trip latency of successful relay probes",
        &["remote_host"],
        vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("metric can be registered")
});

static PROBE_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "nerf_endpoint_probe_failures_total",
        "Relay probes that did not yield a latency",
        &["remote_host"]
    )
    .expect("metric can be registered")
});

pub fn record_sync_success(elapsed: Duration, teams: usize) {
    DIRECTORY_SYNCS_TOTAL.with_label_values(&["success"]).inc();
    DIRECTORY_SYNC_DURATION.observe(elapsed.as_secs_f64());
    DIRECTORY_TEAMS.set(teams as i64);
}

pub fn record_sync_failure(elapsed: Duration) {
    DIRECTORY_SYNCS_TOTAL.with_label_values(&["failure"]).inc();
    DIRECTORY_SYNC_DURATION.observe(elapsed.as_secs_f64());
}

pub fn record_probe(remote_host: &str, latency: &Latency) {
    match latency.as_millis() {
        Some(ms) => PROBE_LATENCY
            .with_label_values(&[remote_host])
            .observe(ms as f64 / 1000.0),
        None => PROBE_FAILURES.with_label_values(&[remote_host]).inc(),
    }
}

/// Renders all registered metrics in the Prometheus text format
pub fn gather() -> Result<String> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&prometheus::gather(), &mut buffer)
        .context("Failed to encode metrics")?;
    String::from_utf8(buffer).context("Metrics are not valid UTF-8")
}

async fn handle(req: Request<Body>) -> Result<Response<Body>, Infallible> {
    if req.uri().path() != "/metrics" {
        let mut not_found = Response::new(Body::from("Not Found"));
        *not_found.status_mut() = StatusCode::NOT_FOUND;
        return Ok(not_found);
    }

    let response = match gather() {
        Ok(text) => Response::builder()
            .header(header::CONTENT_TYPE, "text/plain; version=0.0.4")
            .body(Body::from(text)),
        Err(e) => {
            error!("Failed to gather metrics: {}", e);
            Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .body(Body::empty())
        }
    };

    Ok(response.unwrap_or_else(|_| Response::new(Body::empty())))
}

/// Serves `/metrics` on `addr` until the task is dropped
pub async fn serve(addr: SocketAddr) -> Result<()> {
    let make_svc = make_service_fn(|_conn| async { Ok::<_, Infallible>(service_fn(handle)) });

    let server = Server::try_bind(&addr)
        .with_context(|| format!("Failed to bind metrics endpoint on {}", addr))?
        .serve(make_svc);

    info!("Metrics endpoint listening on http://{}/metrics", addr);
    server.await.context("Metrics server failed")
}
