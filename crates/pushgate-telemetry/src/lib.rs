//! Logging and metrics for the pushgate gateway.
//!
//! [`Telemetry::init`] installs the process-wide `tracing` subscriber and
//! creates the [`MetricsRegistry`] shared by the plugin executor and the
//! HTTP dispatcher.
//!
//! ```ignore
//! let config = TelemetryConfig::for_serve("info", None, true)?;
//! let telemetry = Telemetry::init(&config)?;
//! pushgate_telemetry::log_startup!(format = %telemetry.log_format(), "starting");
//! ```

pub mod config;
pub mod logging;
pub mod metrics;
pub mod prometheus;

pub use config::{LogFormat, TelemetryConfig};
pub use logging::events;
pub use metrics::MetricsRegistry;
pub use prometheus::PROMETHEUS_CONTENT_TYPE;

use std::sync::Arc;
use thiserror::Error;

/// Telemetry errors.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The subscriber could not be built or installed.
    #[error("failed to initialize logging: {0}")]
    LoggingInit(String),

    /// `--log-format` named something other than json or pretty.
    #[error("unknown log format '{0}' (expected json or pretty)")]
    InvalidLogFormat(String),
}

/// Process telemetry handle.
///
/// Owns the shared [`MetricsRegistry`]; the `tracing` subscriber it installs
/// is global.
pub struct Telemetry {
    log_format: LogFormat,
    metrics: Arc<MetricsRegistry>,
}

impl Telemetry {
    /// Fails if a global subscriber is already installed.
    pub fn init(config: &TelemetryConfig) -> Result<Self, TelemetryError> {
        logging::init_logging(config)?;
        Ok(Self::without_logging(config))
    }

    /// Build the handle without touching the global subscriber.
    pub fn without_logging(config: &TelemetryConfig) -> Self {
        Self {
            log_format: config.log_format,
            metrics: Arc::new(MetricsRegistry::new()),
        }
    }

    /// Format the installed subscriber writes.
    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Shared metrics registry.
    pub fn metrics(&self) -> Arc<MetricsRegistry> {
        Arc::clone(&self.metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_share_one_registry() {
        let telemetry = Telemetry::without_logging(&TelemetryConfig::default());
        telemetry.metrics().connection_opened();
        assert_eq!(telemetry.metrics().active_connections.get(), 1);
        assert_eq!(telemetry.log_format(), LogFormat::Json);
    }
}
