//! Metric delivery backends.
//!
//! The middleware talks to its time-series store through [`MetricsBackend`]:
//! one call per emitted batch. Two implementations ship with the crate:
//!
//! - [`HttpBackend`] — posts `PutMetricData` requests to a regional
//!   monitoring endpoint, with its own timeout and bounded retries.
//! - [`MemoryBackend`] — keeps every request in memory. Handy in tests and
//!   when running locally without credentials.

mod client;
mod memory;

pub use self::client::{HttpBackend, HttpBackendConfig};
pub use self::memory::MemoryBackend;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::metric::MetricDatum;

/// A single emission: one namespace, one batch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PutMetricData {
    pub namespace: String,
    pub metric_data: Vec<MetricDatum>,
}

/// Why a delivery failed.
///
/// [`Service`](BackendError::Service) means the backend understood the
/// request and refused it. Everything else is a transport-level failure.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("{code}: {message}")]
    Service { code: String, message: String },

    #[error("transport: {0}")]
    Transport(String),

    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("encode: {0}")]
    Encode(#[from] serde_json::Error),
}

impl BackendError {
    /// The backend's error code, for service errors.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Service { code, .. } => Some(code),
            _ => None,
        }
    }

    /// Whether a retry could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout(_) => true,
            Self::Service { code, .. } => {
                code.contains("Throttling") || code == "ServiceUnavailable" || code == "InternalFailure"
            }
            Self::Encode(_) => false,
        }
    }
}

/// Where metric batches go.
#[async_trait]
pub trait MetricsBackend: Send + Sync {
    async fn put_metric_data(&self, input: &PutMetricData) -> Result<(), BackendError>;
}
