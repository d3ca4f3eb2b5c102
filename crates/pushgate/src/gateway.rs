//! HTTP dispatch for webhook, account and reserved endpoints.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Body;
use hyper::header::{HeaderValue, ALLOW, CONTENT_LENGTH, CONTENT_TYPE};
use hyper::{Method, Request, Response, StatusCode};
use pushgate_script::{
    ExecutionResult, PluginExecutor, PluginRegistry, RequestContext, DEFAULT_CONTENT_TYPE,
};
use pushgate_telemetry::{MetricsRegistry, PROMETHEUS_CONTENT_TYPE};

use crate::accounts::{AccountReply, Accounts};
use crate::config::DEFAULT_MAX_BODY_SIZE;
use crate::problem::{json_response, ProblemDetails};

/// Webhook routes; the rest of the path is the plugin name.
pub const WEBHOOK_PREFIX: &str = "/v1/webhook/";
/// Bind a user, optionally with a device.
pub const BIND_USER_PATH: &str = "/v1/bind-user";
/// Unbind a device from a user.
pub const UNBIND_USER_PATH: &str = "/v1/unbind-user";
/// Liveness probe.
pub const HEALTH_PATH: &str = "/__pushgate/health";
/// Prometheus text exposition.
pub const METRICS_PATH: &str = "/__pushgate/metrics";

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The request-serving half of the gateway.
pub struct Gateway {
    registry: Arc<PluginRegistry>,
    executor: Arc<PluginExecutor>,
    metrics: Arc<MetricsRegistry>,
    accounts: Option<Accounts>,
    max_body_size: usize,
}

impl Gateway {
    pub fn new(
        registry: Arc<PluginRegistry>,
        executor: Arc<PluginExecutor>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            registry,
            executor,
            metrics,
            accounts: None,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        }
    }

    /// Enable the bind/unbind routes.
    ///
    /// The `pushgate` binary ships without an account store, so these routes
    /// answer 404 until an embedder supplies an [`Accounts`] backed by its own
    /// [`AccountService`](crate::AccountService) and
    /// [`SignatureVerifier`](crate::SignatureVerifier).
    pub fn with_accounts(mut self, accounts: Accounts) -> Self {
        self.accounts = Some(accounts);
        self
    }

    /// Largest accepted request body, in bytes. Larger bodies get 413.
    pub fn with_max_body_size(mut self, max_body_size: usize) -> Self {
        self.max_body_size = max_body_size;
        self
    }

    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    /// Handle an incoming HTTP request.
    pub async fn handle_request<B>(
        &self,
        req: Request<B>,
    ) -> Result<Response<Full<Bytes>>, Infallible>
    where
        B: Body,
        B::Error: Into<BoxError>,
    {
        let started = Instant::now();
        let method = req.method().clone();

        let (route, response) = self.route(req).await;

        let status = response.status().as_u16();
        let elapsed = started.elapsed();
        self.metrics
            .record_request(method.as_str(), route, status, elapsed.as_secs_f64());
        pushgate_telemetry::log_request_completed!(
            method = %method,
            route,
            status,
            duration_ms = elapsed.as_millis() as u64
        );

        Ok(response)
    }

    /// Returns the route label alongside the response.
    async fn route<B>(&self, req: Request<B>) -> (&'static str, Response<Full<Bytes>>)
    where
        B: Body,
        B::Error: Into<BoxError>,
    {
        let path = req.uri().path().to_string();

        match path.as_str() {
            HEALTH_PATH => ("health", self.reserved(req.method(), Self::health_response)),
            METRICS_PATH => ("metrics", self.reserved(req.method(), Self::metrics_response)),
            BIND_USER_PATH => ("bind_user", self.account(req, Accounts::bind_user).await),
            UNBIND_USER_PATH => ("unbind_user", self.account(req, Accounts::unbind_user).await),
            _ => match path.strip_prefix(WEBHOOK_PREFIX) {
                Some(name) => ("webhook", self.webhook(name, req).await),
                None => (
                    "unmatched",
                    ProblemDetails::not_found("no route matches this path").into_response(),
                ),
            },
        }
    }

    async fn webhook<B>(&self, segment: &str, req: Request<B>) -> Response<Full<Bytes>>
    where
        B: Body,
        B::Error: Into<BoxError>,
    {
        if req.method() != Method::POST {
            return method_not_allowed_response(&[Method::POST]);
        }
        if segment.is_empty() || segment.contains('/') {
            return ProblemDetails::not_found("no route matches this path").into_response();
        }
        let Ok(name) = urlencoding::decode(segment) else {
            return ProblemDetails::not_found("webhook name is not valid UTF-8").into_response();
        };
        let name: &str = &name;

        let descriptor = match self.registry.resolve(name) {
            Ok(descriptor) => descriptor,
            Err(e) => return ProblemDetails::not_found(e.to_string()).into_response(),
        };

        let request = match self.read_context(req).await {
            Ok(request) => request,
            Err(response) => return response,
        };

        // Queue here rather than on the blocking pool, so a backlog on one
        // plugin never holds threads other plugins need.
        let permit = descriptor.admit().await;
        let executor = Arc::clone(&self.executor);
        let outcome = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            executor.execute(&descriptor, request)
        })
        .await;

        match outcome {
            Ok(Ok(result)) => plugin_response(name, result),
            // Already logged with the script error by the executor.
            Ok(Err(_)) => ProblemDetails::bad_request("webhook plugin failed").into_response(),
            Err(e) => {
                tracing::error!(plugin = %name, error = %e, "webhook worker task failed");
                ProblemDetails::internal_error().into_response()
            }
        }
    }

    async fn account<B>(
        &self,
        req: Request<B>,
        handler: fn(&Accounts, &RequestContext) -> AccountReply,
    ) -> Response<Full<Bytes>>
    where
        B: Body,
        B::Error: Into<BoxError>,
    {
        let Some(accounts) = &self.accounts else {
            return ProblemDetails::not_found("no route matches this path").into_response();
        };
        if req.method() != Method::POST {
            return method_not_allowed_response(&[Method::POST]);
        }

        let request = match self.read_context(req).await {
            Ok(request) => request,
            Err(response) => return response,
        };

        let reply = handler(accounts, &request);
        json_response(reply.status, &reply.body)
    }

    fn reserved(
        &self,
        method: &Method,
        respond: fn(&Self) -> Response<Full<Bytes>>,
    ) -> Response<Full<Bytes>> {
        if method != Method::GET && method != Method::HEAD {
            return method_not_allowed_response(&[Method::GET, Method::HEAD]);
        }
        respond(self)
    }

    /// Collect the body under the size limit and snapshot the request.
    async fn read_context<B>(&self, req: Request<B>) -> Result<RequestContext, Response<Full<Bytes>>>
    where
        B: Body,
        B::Error: Into<BoxError>,
    {
        let declared = req
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok());
        if declared.is_some_and(|len| len > self.max_body_size) {
            return Err(ProblemDetails::payload_too_large(self.max_body_size).into_response());
        }

        let (parts, body) = req.into_parts();
        let body = match Limited::new(body, self.max_body_size).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
                return Err(ProblemDetails::payload_too_large(self.max_body_size).into_response());
            }
            Err(e) => {
                tracing::debug!(error = %e, "failed to read request body");
                return Err(ProblemDetails::bad_request("failed to read request body").into_response());
            }
        };

        Ok(RequestContext::from_parts(&parts, body))
    }

    fn health_response(&self) -> Response<Full<Bytes>> {
        let body = serde_json::json!({
            "status": "healthy",
            "plugins_count": self.registry.len(),
        });
        json_response(StatusCode::OK, &body)
    }

    fn metrics_response(&self) -> Response<Full<Bytes>> {
        let body = pushgate_telemetry::prometheus::render_metrics(&self.metrics);
        let mut response = Response::new(Full::new(Bytes::from(body)));
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static(PROMETHEUS_CONTENT_TYPE));
        response
    }
}

fn method_not_allowed_response(allowed: &[Method]) -> Response<Full<Bytes>> {
    let mut response = ProblemDetails::method_not_allowed().into_response();
    let allow = allowed
        .iter()
        .map(Method::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    if let Ok(value) = HeaderValue::from_str(&allow) {
        response.headers_mut().insert(ALLOW, value);
    }
    response
}

/// Turn a plugin's returned triple into the HTTP response.
fn plugin_response(plugin: &str, result: ExecutionResult) -> Response<Full<Bytes>> {
    let status = StatusCode::from_u16(result.status_code).unwrap_or(StatusCode::OK);
    let content_type = match HeaderValue::from_str(&result.content_type) {
        Ok(value) => value,
        Err(_) => {
            tracing::warn!(plugin, content_type = %result.content_type, "plugin returned an invalid content type");
            HeaderValue::from_static(DEFAULT_CONTENT_TYPE)
        }
    };

    let mut response = Response::new(Full::new(result.body));
    *response.status_mut() = status;
    response.headers_mut().insert(CONTENT_TYPE, content_type);
    response
}
