//! # latencywatch
//!
//! Request-latency instrumentation for HTTP services. A middleware times
//! every request, builds a `Latency` datum (microseconds, tagged with the
//! request URI and client address) and ships it to a time-series backend.
//! Delivery problems end up in the logs, never in the response.
//!
//! ## What you get
//!
//! - [`LatencyMiddleware`] — the timing lifecycle, with swappable
//!   [`Hooks`](middleware::Hooks) before and after the handler
//! - an exclusion list for paths you do not want measured (health probes)
//! - a per-request [`MetricsHandle`] so handlers can emit their own metrics
//! - [`backend::HttpBackend`] with bounded retries, and
//!   [`backend::MemoryBackend`] for tests
//! - a small hyper-based [`Router`] / [`Server`] to host it all
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use http::Method;
//! use latencywatch::{LatencyMiddleware, Request, Response, Router, Server, health};
//!
//! #[tokio::main]
//! async fn main() {
//!     let metrics = Arc::new(LatencyMiddleware::new("us-east-1", "shop"));
//!     metrics.exclude_url("/healthz").unwrap();
//!
//!     let app = Router::new()
//!         .on(Method::GET, "/users/{id}", get_user)
//!         .on(Method::GET, "/healthz", health::liveness)
//!         .wrap(metrics);
//!
//!     Server::bind("0.0.0.0:3000").serve(app).await.unwrap();
//! }
//!
//! async fn get_user(req: Request) -> Response {
//!     let id = req.param("id").unwrap_or("unknown");
//!     Response::json(format!(r#"{{"id":"{id}"}}"#).into_bytes())
//! }
//! ```

mod error;
mod handler;
mod request;
mod response;
mod router;
mod server;

pub mod backend;
pub mod clock;
pub mod config;
pub mod emitter;
pub mod exclusion;
pub mod health;
pub mod metric;
pub mod middleware;

pub use config::Config;
pub use emitter::{MetricEmitter, MetricsHandle};
pub use error::Error;
pub use handler::{BoxFuture, Handler};
pub use middleware::LatencyMiddleware;
pub use request::{Request, RequestBuilder};
pub use response::{IntoResponse, Response, ResponseBuilder};
pub use router::Router;
pub use server::Server;
