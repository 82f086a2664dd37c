//! Batch emission and the per-request emission handle.
//!
//! [`MetricEmitter`] is what actually ships a batch: it tags it with the
//! namespace, hands it to the backend, and swallows whatever goes wrong.
//! A failed delivery shows up in the logs and nowhere else; the request
//! being instrumented never sees it.
//!
//! [`RequestScope`] and [`MetricsHandle`] expose the emitter to downstream
//! handlers for exactly one request:
//!
//! ```text
//! middleware opens RequestScope ──► before-hook stores MetricsHandle in the request
//!                                        │
//!                        handler: req.extension::<MetricsHandle>()?.emit(batch)
//!                                        │
//! middleware closes RequestScope ◄── after-hook
//!         (handle now inert)
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, warn};

use crate::backend::{BackendError, MetricsBackend, PutMetricData};
use crate::metric::MetricDatum;

/// Delivers metric batches under one namespace.
///
/// Cloning is cheap: two `Arc`s.
#[derive(Clone)]
pub struct MetricEmitter {
    namespace: Arc<str>,
    backend: Arc<dyn MetricsBackend>,
}

impl MetricEmitter {
    pub fn new(namespace: impl Into<Arc<str>>, backend: Arc<dyn MetricsBackend>) -> Self {
        Self { namespace: namespace.into(), backend }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Sends `batch` in a single backend call.
    ///
    /// Never fails: delivery errors are logged and dropped. An empty batch
    /// is not sent.
    pub async fn emit(&self, batch: Vec<MetricDatum>) {
        if batch.is_empty() {
            debug!(namespace = %self.namespace, "empty metric batch; nothing to send");
            return;
        }

        let count = batch.len();
        let input = PutMetricData { namespace: self.namespace.to_string(), metric_data: batch };

        match self.backend.put_metric_data(&input).await {
            Ok(()) => debug!(namespace = %self.namespace, count, "metrics delivered"),
            Err(BackendError::Service { code, message }) => {
                warn!(namespace = %self.namespace, count, %code, %message, "backend rejected metrics");
            }
            Err(e) => error!(namespace = %self.namespace, count, error = %e, "metric delivery failed"),
        }
    }
}

impl std::fmt::Debug for MetricEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricEmitter").field("namespace", &self.namespace).finish_non_exhaustive()
    }
}

type Slot = Arc<Mutex<Option<MetricEmitter>>>;

/// Owns the emission capability for one request.
///
/// Created by the middleware before the pre-hook and closed after the
/// post-hook. Closing is idempotent.
#[derive(Debug)]
pub struct RequestScope {
    slot: Slot,
}

impl RequestScope {
    pub fn open(emitter: MetricEmitter) -> Self {
        Self { slot: Arc::new(Mutex::new(Some(emitter))) }
    }

    /// A handle downstream code can emit through until the scope closes.
    pub fn handle(&self) -> MetricsHandle {
        MetricsHandle { slot: Arc::clone(&self.slot) }
    }

    pub fn close(&self) {
        self.slot.lock().take();
    }

    pub fn is_closed(&self) -> bool {
        self.slot.lock().is_none()
    }
}

/// Request-scoped emission capability.
///
/// Fetch it from the request inside a handler:
///
/// ```rust,no_run
/// use latencywatch::{MetricsHandle, Request, Response};
/// use latencywatch::metric::{MetricDatum, Unit};
///
/// async fn checkout(req: Request) -> Response {
///     if let Some(metrics) = req.extension::<MetricsHandle>() {
///         metrics.emit(vec![MetricDatum::new("CartSize", 3.0, Unit::Count)]).await;
///     }
///     Response::text("ok")
/// }
/// ```
#[derive(Clone, Debug)]
pub struct MetricsHandle {
    slot: Slot,
}

impl MetricsHandle {
    /// Emits `batch` if the owning request is still in flight; otherwise
    /// drops it.
    pub async fn emit(&self, batch: Vec<MetricDatum>) {
        let emitter = self.slot.lock().clone();
        match emitter {
            Some(emitter) => emitter.emit(batch).await,
            None => debug!(count = batch.len(), "request scope closed; dropping metrics"),
        }
    }

    pub fn is_active(&self) -> bool {
        self.slot.lock().is_some()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::backend::MemoryBackend;
    use crate::metric::Unit;

    struct Unreachable;

    #[async_trait]
    impl MetricsBackend for Unreachable {
        async fn put_metric_data(&self, _: &PutMetricData) -> Result<(), BackendError> {
            Err(BackendError::Transport("connection refused".into()))
        }
    }

    fn datum() -> MetricDatum {
        MetricDatum::new("Hits", 1.0, Unit::Count)
    }

    #[tokio::test]
    async fn tags_batch_with_namespace() {
        let backend = MemoryBackend::new();
        let emitter = MetricEmitter::new("shop", Arc::new(backend.clone()));
        emitter.emit(vec![datum(), datum()]).await;

        let requests = backend.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].namespace, "shop");
        assert_eq!(requests[0].metric_data.len(), 2);
    }

    #[tokio::test]
    async fn empty_batch_is_not_sent() {
        let backend = MemoryBackend::new();
        MetricEmitter::new("shop", Arc::new(backend.clone())).emit(Vec::new()).await;
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn delivery_failure_is_swallowed() {
        let emitter = MetricEmitter::new("shop", Arc::new(Unreachable));
        // returns normally
        emitter.emit(vec![datum()]).await;
    }

    #[tokio::test]
    async fn handle_is_inert_after_close() {
        let backend = MemoryBackend::new();
        let scope = RequestScope::open(MetricEmitter::new("shop", Arc::new(backend.clone())));
        let handle = scope.handle();

        handle.emit(vec![datum()]).await;
        assert_eq!(backend.call_count(), 1);

        scope.close();
        scope.close();
        assert!(scope.is_closed());
        assert!(!handle.is_active());

        handle.emit(vec![datum()]).await;
        assert_eq!(backend.call_count(), 1);
    }
}
