use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

use crate::config::MetricsConfig;
use crate::utils::error::AppError;

/// Start the Prometheus scrape endpoint when enabled.
pub fn init_metrics(config: &MetricsConfig) -> Result<(), AppError> {
    if !config.enabled {
        tracing::debug!("Metrics exporter disabled");
        return Ok(());
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| AppError::Internal(format!("metrics exporter on {}: {}", addr, e)))?;

    tracing::info!("Metrics exporter listening on {}", addr);
    Ok(())
}
