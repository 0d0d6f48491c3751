//! Tracing and metrics setup shared by every process mode.

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::path::Path;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LoggingConfig, MetricsConfig};
use crate::utils::error::{AppError, Result};

const DEFAULT_FILTER: &str = "rivalprice_monitor=info";
const LOG_FILE_PREFIX: &str = "rivalprice-monitor.log";

/// Initialize logging with tracing.
///
/// When a log directory is configured the returned guard must be kept alive
/// for the duration of the program, or buffered lines are lost.
pub fn init_tracing(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true);

    let Some(directory) = config.directory.as_deref() else {
        tracing_subscriber::registry()
            .with(filter)
            .with(stderr_layer)
            .init();
        return None;
    };

    std::fs::create_dir_all(Path::new(directory)).ok();
    let file_appender = RollingFileAppender::new(Rotation::DAILY, directory, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(true),
        )
        .init();

    Some(guard)
}

/// Installs the Prometheus recorder and its scrape endpoint. Without it the
/// `metrics` macros are no-ops.
pub fn init_metrics(config: &MetricsConfig) -> Result<()> {
    if !config.enabled {
        return Ok(());
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| AppError::Internal(format!("failed to install metrics exporter: {}", e)))?;

    info!("Metrics exporter listening on {}", addr);
    Ok(())
}
