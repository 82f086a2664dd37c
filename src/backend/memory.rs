use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{BackendError, MetricsBackend, PutMetricData};

/// Records every request instead of sending it anywhere.
///
/// Clones share the same log, so keep one clone to inspect what the
/// middleware emitted:
///
/// ```rust
/// # use std::sync::Arc;
/// use latencywatch::backend::MemoryBackend;
/// use latencywatch::LatencyMiddleware;
///
/// let backend = MemoryBackend::new();
/// let mut mw = LatencyMiddleware::new("us-east-1", "test");
/// mw.set_backend(Arc::new(backend.clone()));
/// assert_eq!(backend.call_count(), 0);
/// ```
#[derive(Clone, Debug, Default)]
pub struct MemoryBackend {
    requests: Arc<Mutex<Vec<PutMetricData>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every request received so far, oldest first.
    pub fn requests(&self) -> Vec<PutMetricData> {
        self.requests.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn clear(&self) {
        self.requests.lock().clear();
    }
}

#[async_trait]
impl MetricsBackend for MemoryBackend {
    async fn put_metric_data(&self, input: &PutMetricData) -> Result<(), BackendError> {
        self.requests.lock().push(input.clone());
        Ok(())
    }
}
