//! Logging and metrics.
//!
//! Logging goes through a `tracing_subscriber` registry with an env filter
//! and a text or JSON formatter. Metrics are recorded with the `metrics`
//! macros and rendered by the Prometheus recorder installed at startup.
//!
//! # Metrics
//!
//! - `service_op_count`, `service_err_count`, `service_op_latency_seconds`
//!   (labels `component, method, namespace, service, store`)
//! - `handler_request_count`, `handler_request_latency_seconds`,
//!   `handler_response_bytes` (labels `route, status, version`)
//! - `sims_changes_consumed`, `sims_messages_sent`, `sims_batches_acked`,
//!   `sims_dispatch_errors` (label `source`)

use anyhow::{Context, Result};
use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::info;

use crate::config::{LogFormat, LoggingConfig};

static PROMETHEUS: OnceLock<PrometheusHandle> = OnceLock::new();

/// Installs the global tracing subscriber. `RUST_LOG` overrides the
/// configured filter.
pub fn init_logging(config: &LoggingConfig) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.filter));

    let registry = tracing_subscriber::registry().with(filter);
    let result = match config.format {
        LogFormat::Text => registry.with(fmt::layer()).try_init(),
        LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
    };
    if result.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

/// Installs the Prometheus recorder, serving it on `listen` when given.
///
/// Safe to call more than once; later calls return the first handle.
///
/// # Errors
///
/// Returns an error if the recorder or its listener cannot be set up.
pub fn install_metrics(listen: Option<SocketAddr>) -> Result<PrometheusHandle> {
    if let Some(handle) = PROMETHEUS.get() {
        return Ok(handle.clone());
    }

    let handle = match listen {
        Some(addr) => {
            let (recorder, exporter) = PrometheusBuilder::new()
                .with_http_listener(addr)
                .build()
                .context("Failed to build Prometheus exporter")?;
            let handle = recorder.handle();
            metrics::set_global_recorder(recorder).context("Metrics recorder already installed")?;
            tokio::spawn(async move {
                if let Err(err) = exporter.await {
                    tracing::error!(error = ?err, "Prometheus exporter stopped");
                }
            });
            info!(%addr, "Prometheus exporter listening");
            handle
        },
        None => PrometheusBuilder::new()
            .install_recorder()
            .context("Failed to install metrics recorder")?,
    };

    Ok(PROMETHEUS.get_or_init(|| handle).clone())
}

/// Prometheus exposition of the installed recorder, empty when none is.
pub fn render_metrics() -> String {
    PROMETHEUS.get().map(PrometheusHandle::render).unwrap_or_default()
}

/// Records one storage call.
pub fn record_service_op(
    method: &'static str,
    namespace: &str,
    service: &'static str,
    store: &'static str,
    elapsed: Duration,
    failed: bool,
) {
    let labels = [
        ("component", "service".to_string()),
        ("method", method.to_string()),
        ("namespace", namespace.to_string()),
        ("service", service.to_string()),
        ("store", store.to_string()),
    ];
    counter!("service_op_count", &labels).increment(1);
    if failed {
        counter!("service_err_count", &labels).increment(1);
    }
    histogram!("service_op_latency_seconds", &labels).record(elapsed.as_secs_f64());
}

/// Records one HTTP request.
pub fn record_request(route: &str, status: u16, elapsed: Duration, bytes: u64) {
    let labels = [
        ("route", route.to_string()),
        ("status", status.to_string()),
        ("version", crate::constants::API_VERSION.to_string()),
    ];
    counter!("handler_request_count", &labels).increment(1);
    histogram!("handler_request_latency_seconds", &labels).record(elapsed.as_secs_f64());
    histogram!("handler_response_bytes", &labels).record(bytes as f64);
}

/// SIMS counters.
pub fn record_consumed(source: &'static str) {
    counter!("sims_changes_consumed", "source" => source).increment(1);
}

pub fn record_sent(source: &str, messages: u64) {
    counter!("sims_messages_sent", "source" => source.to_string()).increment(messages);
}

pub fn record_acked(source: &str) {
    counter!("sims_batches_acked", "source" => source.to_string()).increment(1);
}

pub fn record_dispatch_error(source: &str) {
    counter!("sims_dispatch_errors", "source" => source.to_string()).increment(1);
}
