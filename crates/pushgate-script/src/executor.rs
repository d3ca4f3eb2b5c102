//! Plugin execution: lazy compile, per-plugin serialization, invoke.
//!
//! Each [`PluginDescriptor`] owns one Lua state behind a mutex. The first
//! call compiles under that lock, so racing first calls compile exactly
//! once; a failed compile leaves the slot empty and the next call retries.
//! Invocations of one plugin run one after another, different plugins run
//! in parallel. Async callers queue on [`PluginDescriptor::admit`] before
//! handing the call to a blocking thread.

use std::sync::Arc;
use std::time::Instant;

use pushgate_telemetry::MetricsRegistry;

use crate::bridge::ContextBridge;
use crate::context::RequestContext;
use crate::engine::ScriptEngine;
use crate::error::ScriptError;
use crate::instance::PluginInstance;
use crate::registry::PluginDescriptor;
use crate::result::ExecutionResult;

/// Runs webhook plugins.
#[derive(Default)]
pub struct PluginExecutor {
    engine: ScriptEngine,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl PluginExecutor {
    pub fn new(engine: ScriptEngine) -> Self {
        Self {
            engine,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Run `descriptor`'s script against one request.
    ///
    /// Blocks while another invocation of the same plugin is in flight.
    pub fn execute(
        &self,
        descriptor: &PluginDescriptor,
        request: RequestContext,
    ) -> Result<ExecutionResult, ScriptError> {
        let started = Instant::now();
        let outcome = self.run(descriptor, request);
        let elapsed = started.elapsed().as_secs_f64();

        let label = match &outcome {
            Ok(_) => "ok",
            Err(e) => {
                if e.is_load_error() {
                    pushgate_telemetry::log_plugin_load_failed!(
                        plugin = %descriptor.name(),
                        error = %e,
                        "webhook plugin failed to load"
                    );
                } else {
                    pushgate_telemetry::log_plugin_runtime_error!(
                        plugin = %descriptor.name(),
                        error = %e,
                        "webhook plugin raised an error"
                    );
                }
                e.outcome()
            }
        };
        if let Some(metrics) = &self.metrics {
            metrics.record_plugin_invocation(descriptor.name(), label, elapsed);
        }

        outcome
    }

    /// Compile ahead of traffic. A no-op when already compiled.
    pub fn warm(&self, descriptor: &PluginDescriptor) -> Result<(), ScriptError> {
        let mut runtime = descriptor.runtime.lock();
        if runtime.is_none() {
            *runtime = Some(self.compile(descriptor)?);
        }
        Ok(())
    }

    fn run(
        &self,
        descriptor: &PluginDescriptor,
        request: RequestContext,
    ) -> Result<ExecutionResult, ScriptError> {
        let mut runtime = descriptor.runtime.lock();
        let instance = match &mut *runtime {
            Some(instance) => instance,
            empty => empty.insert(self.compile(descriptor)?),
        };

        let bridge = ContextBridge::bind(request, Arc::clone(descriptor.env()));
        let result = instance.invoke(bridge.clone());
        bridge.detach();
        result
    }

    fn compile(&self, descriptor: &PluginDescriptor) -> Result<PluginInstance, ScriptError> {
        let compiled = descriptor
            .source()
            .load()
            .and_then(|source| self.engine.compile(descriptor.name(), &source));

        if let Some(metrics) = &self.metrics {
            metrics.record_compilation(descriptor.name(), compiled.is_ok());
        }
        if let Ok(instance) = &compiled {
            pushgate_telemetry::log_plugin_compiled!(plugin = %instance.name(), "webhook plugin compiled");
        }

        compiled
    }
}
