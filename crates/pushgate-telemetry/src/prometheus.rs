//! Text exposition served at `/__pushgate/metrics`.

use prometheus_client::encoding::text::encode;

use crate::MetricsRegistry;

pub const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

pub fn render_metrics(metrics: &MetricsRegistry) -> String {
    let mut out = String::new();
    if let Err(e) = encode(&mut out, &metrics.registry) {
        tracing::warn!(error = %e, "failed to encode metrics");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_get_total_suffix_once() {
        let metrics = MetricsRegistry::new();
        metrics.record_request("POST", "webhook", 201, 0.004);

        let out = render_metrics(&metrics);
        assert!(out.contains("pushgate_requests_total{"), "{out}");
        assert!(!out.contains("_total_total"), "{out}");
    }

    #[test]
    fn compile_failures_are_labelled() {
        let metrics = MetricsRegistry::new();
        metrics.record_compilation("github", false);
        metrics.connection_opened();

        let out = render_metrics(&metrics);
        assert!(out.contains(r#"pushgate_plugin_compilations_total{plugin="github",result="error"} 1"#), "{out}");
        assert!(out.contains("pushgate_active_connections 1"), "{out}");
    }
}
