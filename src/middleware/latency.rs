//! Per-request latency instrumentation.
//!
//! # Lifecycle
//!
//! ```text
//! request ──► excluded path? ──yes──► next ──► response       (no timing, no hooks)
//!                  │ no
//!                  ▼
//!          resolve client address (X-Real-IP, else peer)
//!          start = clock.now()
//!          open RequestScope, hooks.before
//!          next ──► response
//!          elapsed = clock.elapsed(start)
//!          hooks.after, close RequestScope ──► response
//! ```
//!
//! The handler runs exactly once either way. Nothing here catches a panic
//! from the handler: if it unwinds, the after-hook does not run.
//!
//! # Sharing and reconfiguration
//!
//! Namespace, metric name, backend and clock are set through `&mut self`
//! before the middleware is installed. Exclusions and hooks sit behind
//! locks and can change while traffic is flowing; wrap the middleware in an
//! `Arc`, install a clone, and keep one:
//!
//! ```rust
//! use std::sync::Arc;
//! use latencywatch::{LatencyMiddleware, Router};
//!
//! let metrics = Arc::new(LatencyMiddleware::new("us-east-1", "shop"));
//! let app = Router::new().wrap(Arc::clone(&metrics));
//!
//! metrics.exclude_url("/healthz").unwrap();
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use tracing::trace;

use super::hooks::{DefaultHooks, Hooks, Measurement};
use super::{Middleware, Next};
use crate::backend::{HttpBackend, HttpBackendConfig, MetricsBackend};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::emitter::{MetricEmitter, RequestScope};
use crate::error::Error;
use crate::exclusion::ExclusionSet;
use crate::metric::{MetricDatum, Unit};
use crate::request::Request;
use crate::response::Response;

pub const DEFAULT_LATENCY_METRIC_NAME: &str = "Latency";

/// Measures each request and emits its latency.
pub struct LatencyMiddleware {
    namespace: Arc<str>,
    latency_metric_name: String,
    backend: Arc<dyn MetricsBackend>,
    clock: Arc<dyn Clock>,
    exclusions: ExclusionSet,
    hooks: RwLock<Option<Arc<dyn Hooks>>>,
}

impl LatencyMiddleware {
    /// A middleware shipping to the monitoring endpoint of `region` under
    /// `namespace`, with 5 retries per batch.
    pub fn new(region: &str, namespace: &str) -> Self {
        let backend = HttpBackend::new(HttpBackendConfig::new(region));
        Self::with_backend(namespace, Arc::new(backend))
    }

    /// A middleware shipping to an arbitrary backend.
    pub fn with_backend(namespace: &str, backend: Arc<dyn MetricsBackend>) -> Self {
        Self {
            namespace: Arc::from(namespace),
            latency_metric_name: DEFAULT_LATENCY_METRIC_NAME.to_owned(),
            backend,
            clock: Arc::new(SystemClock),
            exclusions: ExclusionSet::new(),
            hooks: RwLock::new(Some(Arc::new(DefaultHooks))),
        }
    }

    /// Builds the middleware and its HTTP backend from `config`.
    ///
    /// Fails if the endpoint or any excluded URL does not parse.
    pub fn from_config(config: &Config) -> Result<Self, Error> {
        let mut backend = HttpBackendConfig::new(config.region.as_str())
            .with_max_retries(config.max_retries)
            .with_timeout(config.timeout);
        if let Some(endpoint) = &config.endpoint {
            let uri: http::Uri = endpoint.parse().map_err(|e| Error::invalid_url(endpoint, e))?;
            backend = backend.with_endpoint(uri);
        }

        let mut mw = Self::with_backend(&config.namespace, Arc::new(HttpBackend::new(backend)));
        mw.set_latency_metric_name(config.latency_metric_name.as_str());
        for url in &config.excluded_urls {
            mw.exclude_url(url)?;
        }
        Ok(mw)
    }

    // ── Configuration ─────────────────────────────────────────────────────────

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn set_namespace(&mut self, namespace: &str) {
        self.namespace = Arc::from(namespace);
    }

    pub fn latency_metric_name(&self) -> &str {
        &self.latency_metric_name
    }

    pub fn set_latency_metric_name(&mut self, name: impl Into<String>) {
        self.latency_metric_name = name.into();
    }

    pub fn backend(&self) -> &Arc<dyn MetricsBackend> {
        &self.backend
    }

    pub fn set_backend(&mut self, backend: Arc<dyn MetricsBackend>) {
        self.backend = backend;
    }

    pub fn set_clock(&mut self, clock: impl Clock + 'static) {
        self.clock = Arc::new(clock);
    }

    /// The hooks the next request will run. Falls back to [`DefaultHooks`]
    /// when none are set.
    pub fn hooks(&self) -> Arc<dyn Hooks> {
        match &*self.hooks.read() {
            Some(hooks) => Arc::clone(hooks),
            None => Arc::new(DefaultHooks),
        }
    }

    /// Replaces the hooks. Requests already past their before-hook finish
    /// with the hooks they started with.
    pub fn set_hooks(&self, hooks: impl Hooks + 'static) {
        *self.hooks.write() = Some(Arc::new(hooks));
    }

    /// Unsets the hooks; requests fall back to [`DefaultHooks`].
    pub fn clear_hooks(&self) {
        *self.hooks.write() = None;
    }

    // ── Exclusions ────────────────────────────────────────────────────────────

    /// Stops instrumenting requests whose path matches `url`'s path.
    pub fn exclude_url(&self, url: &str) -> Result<(), Error> {
        self.exclusions.exclude(url)
    }

    /// Resumes instrumenting `url`. Returns whether it was excluded.
    pub fn include_url(&self, url: &str) -> Result<bool, Error> {
        self.exclusions.include(url)
    }

    pub fn excluded_urls(&self) -> Vec<String> {
        self.exclusions.excluded()
    }

    pub fn exclusions(&self) -> &ExclusionSet {
        &self.exclusions
    }

    // ── Emission ──────────────────────────────────────────────────────────────

    /// An emitter bound to this middleware's namespace and backend.
    pub fn emitter(&self) -> MetricEmitter {
        MetricEmitter::new(Arc::clone(&self.namespace), Arc::clone(&self.backend))
    }

    /// Sends `batch` under this middleware's namespace. Never fails.
    pub async fn emit(&self, batch: Vec<MetricDatum>) {
        self.emitter().emit(batch).await;
    }

    /// The datum the default after-hook emits for `measurement`.
    pub fn latency_datum(&self, measurement: &Measurement) -> MetricDatum {
        MetricDatum::new(
            self.latency_metric_name.as_str(),
            measurement.elapsed_micros(),
            Unit::Microseconds,
        )
        .with_dimension("RequestURI", measurement.request_uri.as_str())
        .with_dimension("RemoteAddr", measurement.client_addr.as_str())
        .with_timestamp(Utc::now())
    }
}

/// `X-Real-IP` when present and non-empty, else the transport peer address.
pub(crate) fn client_addr(req: &Request) -> String {
    match req.header("x-real-ip") {
        Some(ip) if !ip.is_empty() => ip.to_owned(),
        _ => req.remote_addr().to_string(),
    }
}

#[async_trait]
impl Middleware for LatencyMiddleware {
    async fn handle(&self, mut req: Request, next: Next<'_>) -> Response {
        let hooks = self.hooks();

        if self.exclusions.is_excluded(req.path()) {
            trace!(path = req.path(), "path excluded from latency instrumentation");
            return next.run(req).await;
        }

        let client_addr = client_addr(&req);
        let start = self.clock.now();

        let scope = RequestScope::open(self.emitter());
        hooks.before(self, &mut req, &scope, &client_addr);

        let method = req.method().clone();
        let request_uri = req.request_uri();
        let path = req.path().to_owned();

        let res = next.run(req).await;

        let measurement = Measurement {
            method,
            request_uri,
            path,
            client_addr,
            elapsed: self.clock.elapsed(start),
            status: res.status_code(),
        };

        hooks.after(self, &measurement, &res, &scope).await;
        scope.close();
        res
    }
}

impl std::fmt::Debug for LatencyMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LatencyMiddleware")
            .field("namespace", &self.namespace)
            .field("latency_metric_name", &self.latency_metric_name)
            .field("exclusions", &self.exclusions)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use super::*;
    use crate::backend::MemoryBackend;

    #[test]
    fn defaults() {
        let mw = LatencyMiddleware::new("us-east-1", "test");
        assert_eq!(mw.namespace(), "test");
        assert_eq!(mw.latency_metric_name(), "Latency");
        assert!(mw.excluded_urls().is_empty());
    }

    #[test]
    fn client_addr_prefers_real_ip() {
        let peer: SocketAddr = "192.168.1.5:4711".parse().unwrap();

        let req = Request::builder().remote_addr(peer).header("X-Real-IP", "10.10.10.10").build();
        assert_eq!(client_addr(&req), "10.10.10.10");

        let req = Request::builder().remote_addr(peer).header("X-Real-IP", "").build();
        assert_eq!(client_addr(&req), "192.168.1.5:4711");

        let req = Request::builder().remote_addr(peer).build();
        assert_eq!(client_addr(&req), "192.168.1.5:4711");
    }

    #[test]
    fn exclude_url_rejects_garbage() {
        let mw = LatencyMiddleware::with_backend("test", Arc::new(MemoryBackend::new()));
        mw.exclude_url("/ping").unwrap();
        assert!(mw.exclude_url("http://[oops").is_err());
        assert_eq!(mw.excluded_urls(), vec!["/ping".to_owned()]);
    }

    #[test]
    fn latency_datum_shape() {
        let mut mw = LatencyMiddleware::with_backend("test", Arc::new(MemoryBackend::new()));
        mw.set_latency_metric_name("RequestLatency");
        let m = Measurement {
            method: http::Method::GET,
            request_uri: "/stuff?rly=ya".into(),
            path: "/stuff".into(),
            client_addr: "10.10.10.10".into(),
            elapsed: std::time::Duration::from_micros(10),
            status: http::StatusCode::OK,
        };

        let before = Utc::now();
        let datum = mw.latency_datum(&m);
        assert_eq!(datum.metric_name, "RequestLatency");
        assert_eq!(datum.unit, Unit::Microseconds);
        assert_eq!(datum.value, 10.0);
        assert_eq!(datum.dimensions.len(), 2);
        assert_eq!(datum.dimension("RequestURI"), Some("/stuff?rly=ya"));
        assert_eq!(datum.dimension("RemoteAddr"), Some("10.10.10.10"));
        assert!(datum.timestamp >= before);
    }
}
