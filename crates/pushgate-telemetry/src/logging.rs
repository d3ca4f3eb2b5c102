//! Subscriber setup and the gateway's named log events.
//!
//! Every event the gateway emits on purpose carries an `event` field. The
//! `log_*!` macros fill it in so call sites only pass their own fields.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::{LogFormat, TelemetryConfig, TelemetryError};

/// Install the global subscriber. `RUST_LOG` overrides `config.log_level`.
pub fn init_logging(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| {
            TelemetryError::LoggingInit(format!("invalid log level '{}': {e}", config.log_level))
        })?;

    let subscriber = tracing_subscriber::registry().with(filter);
    let installed = match config.log_format {
        LogFormat::Json => subscriber
            .with(
                fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_current_span(true)
                    .with_span_list(false),
            )
            .try_init(),
        LogFormat::Pretty => subscriber
            .with(fmt::layer().pretty().with_file(true).with_line_number(true))
            .try_init(),
    };

    installed.map_err(|e| TelemetryError::LoggingInit(e.to_string()))
}

/// Values of the `event` field.
pub mod events {
    pub const STARTUP: &str = "startup";
    pub const SHUTDOWN: &str = "shutdown";
    pub const CONFIG_LOADED: &str = "config_loaded";
    pub const LISTENING: &str = "listening";

    /// Name added to the registry; nothing compiled yet.
    pub const PLUGIN_REGISTERED: &str = "plugin_registered";
    /// First successful compile; later calls reuse the state.
    pub const PLUGIN_COMPILED: &str = "plugin_compiled";
    /// Missing source, unreadable file or syntax error.
    pub const PLUGIN_LOAD_FAILED: &str = "plugin_load_failed";
    /// The script raised while running.
    pub const PLUGIN_RUNTIME_ERROR: &str = "plugin_runtime_error";

    pub const REQUEST_COMPLETED: &str = "request_completed";
}

#[macro_export]
macro_rules! log_startup {
    ($($field:tt)*) => { ::tracing::info!(event = $crate::events::STARTUP, $($field)*) };
}

#[macro_export]
macro_rules! log_shutdown {
    ($($field:tt)*) => { ::tracing::info!(event = $crate::events::SHUTDOWN, $($field)*) };
}

#[macro_export]
macro_rules! log_config_loaded {
    ($($field:tt)*) => { ::tracing::info!(event = $crate::events::CONFIG_LOADED, $($field)*) };
}

#[macro_export]
macro_rules! log_listening {
    ($($field:tt)*) => { ::tracing::info!(event = $crate::events::LISTENING, $($field)*) };
}

#[macro_export]
macro_rules! log_plugin_registered {
    ($($field:tt)*) => { ::tracing::debug!(event = $crate::events::PLUGIN_REGISTERED, $($field)*) };
}

#[macro_export]
macro_rules! log_plugin_compiled {
    ($($field:tt)*) => { ::tracing::info!(event = $crate::events::PLUGIN_COMPILED, $($field)*) };
}

#[macro_export]
macro_rules! log_plugin_load_failed {
    ($($field:tt)*) => { ::tracing::error!(event = $crate::events::PLUGIN_LOAD_FAILED, $($field)*) };
}

#[macro_export]
macro_rules! log_plugin_runtime_error {
    ($($field:tt)*) => { ::tracing::warn!(event = $crate::events::PLUGIN_RUNTIME_ERROR, $($field)*) };
}

#[macro_export]
macro_rules! log_request_completed {
    ($($field:tt)*) => { ::tracing::info!(event = $crate::events::REQUEST_COMPLETED, $($field)*) };
}
