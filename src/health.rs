//! Kubernetes health-check handlers.
//!
//! Probes hit these endpoints every few seconds, which drowns real traffic
//! in the latency metrics. Register them and exclude them in one go:
//!
//! ```rust
//! use std::sync::Arc;
//! use http::Method;
//! use latencywatch::{LatencyMiddleware, Router, health};
//!
//! let metrics = Arc::new(LatencyMiddleware::new("us-east-1", "shop"));
//! metrics.exclude_url("/healthz").unwrap();
//! metrics.exclude_url("/readyz").unwrap();
//!
//! let app = Router::new()
//!     .on(Method::GET, "/healthz", health::liveness)
//!     .on(Method::GET, "/readyz", health::readiness)
//!     .wrap(metrics);
//! ```

use crate::{Request, Response};

/// Liveness probe. Always `200 OK` with body `"ok"`.
pub async fn liveness(_req: Request) -> Response {
    Response::text("ok")
}

/// Readiness probe (default implementation). `200 OK` with body `"ready"`.
pub async fn readiness(_req: Request) -> Response {
    Response::text("ready")
}
