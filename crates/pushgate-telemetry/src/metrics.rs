//! Gateway and plugin metrics.
//!
//! Counters are registered without the `_total` suffix; the text encoder
//! appends it.

use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::{Metric, Registry};

/// 1ms doubling up to ~8s.
fn latency_histogram() -> Histogram {
    Histogram::new(exponential_buckets(0.001, 2.0, 14))
}

/// Labels on per-request series.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct RequestLabels {
    /// HTTP method as sent.
    pub method: String,
    /// Route class (`webhook`, `health`, ...), never the raw path.
    pub route: String,
    /// Response status code.
    pub status: u16,
}

/// Plugin invocation labels.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct PluginLabels {
    /// Webhook plugin name.
    pub plugin: String,
    /// `ok`, `load_error` or `runtime_error`.
    pub outcome: String,
}

/// Plugin name only, for duration histograms.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct PluginNameLabels {
    /// Webhook plugin name.
    pub plugin: String,
}

/// Plugin compile attempt labels.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct CompileLabels {
    /// Webhook plugin name.
    pub plugin: String,
    /// `ok` or `error`.
    pub result: String,
}

type HistogramFamily<L> = Family<L, Histogram, fn() -> Histogram>;

/// Every metric the gateway exports, plus the registry that encodes them.
pub struct MetricsRegistry {
    /// Underlying registry, prefixed `pushgate_`.
    pub registry: Registry,

    // Requests
    /// `pushgate_requests_total`
    pub requests_total: Family<RequestLabels, Counter>,
    /// `pushgate_request_duration_seconds`
    pub request_duration_seconds: HistogramFamily<RequestLabels>,

    // Connections
    /// `pushgate_active_connections`
    pub active_connections: Gauge,
    /// `pushgate_connections_total`
    pub connections_total: Counter,

    // Plugins
    /// `pushgate_plugin_invocations_total`
    pub plugin_invocations_total: Family<PluginLabels, Counter>,
    /// `pushgate_plugin_execution_duration_seconds`
    pub plugin_execution_duration_seconds: HistogramFamily<PluginNameLabels>,
    /// `pushgate_plugin_compilations_total`
    pub plugin_compilations_total: Family<CompileLabels, Counter>,
}

impl MetricsRegistry {
    /// Create and register all metrics.
    pub fn new() -> Self {
        let mut registry = Registry::with_prefix("pushgate");

        Self {
            requests_total: register(
                &mut registry,
                "requests",
                "HTTP requests served, by route class and status",
                Family::default(),
            ),
            request_duration_seconds: register(
                &mut registry,
                "request_duration_seconds",
                "Time from request receipt to response, in seconds",
                Family::new_with_constructor(latency_histogram as fn() -> Histogram),
            ),
            active_connections: register(
                &mut registry,
                "active_connections",
                "Open client connections",
                Gauge::default(),
            ),
            connections_total: register(
                &mut registry,
                "connections",
                "Client connections accepted",
                Counter::default(),
            ),
            plugin_invocations_total: register(
                &mut registry,
                "plugin_invocations",
                "Webhook plugin invocations, by outcome",
                Family::default(),
            ),
            plugin_execution_duration_seconds: register(
                &mut registry,
                "plugin_execution_duration_seconds",
                "Webhook plugin run time including a first compile, in seconds",
                Family::new_with_constructor(latency_histogram as fn() -> Histogram),
            ),
            plugin_compilations_total: register(
                &mut registry,
                "plugin_compilations",
                "Webhook plugin compile attempts, by result",
                Family::default(),
            ),
            registry,
        }
    }

    /// Count a served request and observe its duration.
    pub fn record_request(&self, method: &str, route: &str, status: u16, duration_secs: f64) {
        let labels = RequestLabels {
            method: method.to_string(),
            route: route.to_string(),
            status,
        };
        self.request_duration_seconds
            .get_or_create(&labels)
            .observe(duration_secs);
        self.requests_total.get_or_create(&labels).inc();
    }

    /// Count a plugin invocation by outcome and observe its duration.
    pub fn record_plugin_invocation(&self, plugin: &str, outcome: &str, duration_secs: f64) {
        let labels = PluginLabels {
            plugin: plugin.to_string(),
            outcome: outcome.to_string(),
        };
        self.plugin_invocations_total.get_or_create(&labels).inc();
        self.plugin_execution_duration_seconds
            .get_or_create(&PluginNameLabels { plugin: labels.plugin })
            .observe(duration_secs);
    }

    /// Count one compile attempt.
    pub fn record_compilation(&self, plugin: &str, success: bool) {
        let labels = CompileLabels {
            plugin: plugin.to_string(),
            result: if success { "ok" } else { "error" }.to_string(),
        };
        self.plugin_compilations_total.get_or_create(&labels).inc();
    }

    /// Record an accepted connection.
    pub fn connection_opened(&self) {
        self.connections_total.inc();
        self.active_connections.inc();
    }

    /// Record a closed connection.
    pub fn connection_closed(&self) {
        self.active_connections.dec();
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn register<M: Metric + Clone>(registry: &mut Registry, name: &str, help: &str, metric: M) -> M {
    registry.register(name, help, metric.clone());
    metric
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_are_counted_per_label_set() {
        let metrics = MetricsRegistry::new();
        metrics.record_request("POST", "webhook", 201, 0.01);
        metrics.record_request("POST", "webhook", 201, 0.02);
        metrics.record_request("POST", "webhook", 400, 0.02);

        let created = RequestLabels {
            method: "POST".into(),
            route: "webhook".into(),
            status: 201,
        };
        assert_eq!(metrics.requests_total.get_or_create(&created).get(), 2);
    }

    #[test]
    fn connection_gauge_tracks_open_connections() {
        let metrics = MetricsRegistry::new();
        metrics.connection_opened();
        metrics.connection_opened();
        metrics.connection_closed();

        assert_eq!(metrics.active_connections.get(), 1);
        assert_eq!(metrics.connections_total.get(), 2);
    }

    #[test]
    fn plugin_outcomes_are_separate_series() {
        let metrics = MetricsRegistry::new();
        metrics.record_plugin_invocation("github", "ok", 0.001);
        metrics.record_plugin_invocation("github", "runtime_error", 0.001);
        metrics.record_plugin_invocation("github", "ok", 0.001);

        let outcome = |outcome: &str| PluginLabels {
            plugin: "github".into(),
            outcome: outcome.into(),
        };
        assert_eq!(metrics.plugin_invocations_total.get_or_create(&outcome("ok")).get(), 2);
        assert_eq!(
            metrics
                .plugin_invocations_total
                .get_or_create(&outcome("runtime_error"))
                .get(),
            1
        );
    }
}
