//! Telemetry module
//!
//! Logging and Prometheus metrics

mod logging;
mod metrics;

pub use logging::{init_logging, LogFormat};
pub use metrics::{increment, record_latency, set_gauge, CounterMetric, GaugeMetric, LatencyMetric};

use crate::config::TelemetryConfig;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::{Ipv4Addr, SocketAddr};

/// Guard that keeps telemetry alive for the process lifetime
pub struct TelemetryGuard {
    /// Address the metrics endpoint listens on, if enabled
    pub metrics_addr: Option<SocketAddr>,
}

/// Initialize all telemetry subsystems
///
/// Must be called inside a tokio runtime when a metrics port is configured.
pub fn init_telemetry(config: &TelemetryConfig) -> anyhow::Result<TelemetryGuard> {
    init_logging(&config.log_level, config.log_format)?;

    let metrics_addr = match config.metrics_port {
        Some(port) => {
            let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
            PrometheusBuilder::new()
                .with_http_listener(addr)
                .install()
                .map_err(|e| anyhow::anyhow!("Failed to start metrics exporter: {}", e))?;
            tracing::info!(%addr, "Prometheus metrics exporter listening");
            Some(addr)
        }
        None => None,
    };

    Ok(TelemetryGuard { metrics_addr })
}
