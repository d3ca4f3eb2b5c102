//! pushgate push-notification gateway.
//!
//! Loads webhook plugins from a YAML config and serves them over HTTP.

use std::net::SocketAddr;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use serde::Serialize;
use tokio::net::TcpListener;

use pushgate_lib::{Gateway, GatewayConfig};
use pushgate_script::{PluginExecutor, ScriptEngine};
use pushgate_telemetry::{Telemetry, TelemetryConfig};

#[derive(Parser, Debug)]
#[command(name = "pushgate", about = "pushgate notification gateway", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the gateway server.
    Serve {
        /// Path to the YAML config file.
        #[arg(short, long, env = "PUSHGATE_CONFIG")]
        config: String,

        /// Listen address (overrides the config file).
        #[arg(long)]
        listen: Option<String>,

        /// Log level.
        #[arg(long, default_value = "info")]
        log_level: String,

        /// Log format (json or pretty).
        #[arg(long)]
        log_format: Option<String>,

        /// Enable development mode (pretty logs).
        #[arg(long)]
        dev: bool,
    },

    /// Load the config and compile every plugin without serving.
    Check {
        /// Path to the YAML config file.
        #[arg(short, long)]
        config: String,

        /// Output format (text or json).
        #[arg(long, default_value = "text")]
        format: String,
    },
}

#[derive(Debug, Serialize)]
struct CheckResult {
    plugin: String,
    valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct CheckReport {
    config: String,
    valid: bool,
    record_errors: Vec<String>,
    plugins: Vec<CheckResult>,
}

fn run_check(config_path: &str, output_format: &str) -> ExitCode {
    let config = match GatewayConfig::load(Path::new(config_path)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::from(1);
        }
    };

    let (registry, record_errors) = config.build_registry();
    let executor = PluginExecutor::new(ScriptEngine::new());

    let plugins: Vec<CheckResult> = registry
        .names()
        .into_iter()
        .map(|name| {
            let error = registry
                .resolve(&name)
                .map_err(|e| e.to_string())
                .and_then(|descriptor| executor.warm(&descriptor).map_err(|e| e.to_string()))
                .err();
            CheckResult {
                valid: error.is_none(),
                plugin: name,
                error,
            }
        })
        .collect();

    let report = CheckReport {
        config: config_path.to_string(),
        valid: record_errors.is_empty() && plugins.iter().all(|p| p.valid),
        record_errors: record_errors.iter().map(ToString::to_string).collect(),
        plugins,
    };

    if output_format == "json" {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("error: failed to serialize report: {}", e);
                return ExitCode::from(1);
            }
        }
    } else {
        for error in &report.record_errors {
            println!("✗ {}", error);
        }
        for plugin in &report.plugins {
            match &plugin.error {
                None => println!("✓ {}", plugin.plugin),
                Some(e) => println!("✗ {}: {}", plugin.plugin, e),
            }
        }
        let failed = report.record_errors.len() + report.plugins.iter().filter(|p| !p.valid).count();
        println!();
        println!(
            "{} plugin(s) checked, {} problem(s)",
            report.plugins.len(),
            failed
        );
    }

    if report.valid {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    }
}

async fn run_serve(
    config_path: &str,
    listen: Option<String>,
    log_level: &str,
    log_format: Option<&str>,
    dev: bool,
) -> ExitCode {
    let telemetry = match TelemetryConfig::for_serve(log_level, log_format, dev)
        .and_then(|config| Telemetry::init(&config))
    {
        Ok(t) => t,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::from(1);
        }
    };

    match serve(config_path, listen, &telemetry).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "gateway stopped");
            eprintln!("error: {e:#}");
            ExitCode::from(1)
        }
    }
}

async fn serve(config_path: &str, listen: Option<String>, telemetry: &Telemetry) -> anyhow::Result<()> {
    pushgate_telemetry::log_startup!(
        version = env!("CARGO_PKG_VERSION"),
        config = config_path,
        log_format = %telemetry.log_format(),
        "pushgate starting"
    );

    let config = GatewayConfig::load(Path::new(config_path))
        .with_context(|| format!("loading {}", config_path))?;

    let (registry, record_errors) = config.build_registry();
    for error in &record_errors {
        tracing::warn!(error = %error, "skipping webhook record");
    }
    pushgate_telemetry::log_config_loaded!(
        plugins = registry.len(),
        rejected = record_errors.len(),
        "configuration loaded"
    );

    let metrics = telemetry.metrics();
    let executor = PluginExecutor::new(ScriptEngine::new()).with_metrics(Arc::clone(&metrics));

    if config.warm_plugins {
        for name in registry.names() {
            let Ok(descriptor) = registry.resolve(&name) else {
                continue;
            };
            // Retried on first request.
            if let Err(e) = executor.warm(&descriptor) {
                pushgate_telemetry::log_plugin_load_failed!(
                    plugin = %name,
                    error = %e,
                    "webhook plugin failed to compile at startup"
                );
            }
        }
    }

    let gateway = Arc::new(
        Gateway::new(Arc::new(registry), Arc::new(executor), Arc::clone(&metrics))
            .with_max_body_size(config.max_body_size),
    );

    let listen = listen.unwrap_or(config.listen);
    let addr: SocketAddr = listen
        .parse()
        .with_context(|| format!("invalid listen address: {}", listen))?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;

    pushgate_telemetry::log_listening!(address = %addr, "pushgate listening");

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        let (stream, peer) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                    continue;
                }
            },
            _ = &mut shutdown => break,
        };

        let gateway = Arc::clone(&gateway);
        let metrics = Arc::clone(&metrics);
        let io = TokioIo::new(stream);

        tokio::spawn(async move {
            metrics.connection_opened();
            let service = service_fn(move |req| {
                let gateway = Arc::clone(&gateway);
                async move { gateway.handle_request(req).await }
            });

            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                tracing::debug!(peer = %peer, error = %e, "connection error");
            }
            metrics.connection_closed();
        });
    }

    pushgate_telemetry::log_shutdown!("pushgate shutting down");
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Commands::Check { config, format } => run_check(&config, &format),
        Commands::Serve {
            config,
            listen,
            log_level,
            log_format,
            dev,
        } => run_serve(&config, listen, &log_level, log_format.as_deref(), dev).await,
    }
}
