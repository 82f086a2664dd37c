//! Middleware layer.
//!
//! Middleware intercepts a request on its way to the handler and the
//! response on its way back. Each one receives the request plus [`Next`],
//! the rest of the chain, and decides when (and whether) to call it:
//!
//! ```rust
//! use async_trait::async_trait;
//! use latencywatch::middleware::{Middleware, Next};
//! use latencywatch::{Request, Response};
//!
//! struct ServerHeader;
//!
//! #[async_trait]
//! impl Middleware for ServerHeader {
//!     async fn handle(&self, req: Request, next: Next<'_>) -> Response {
//!         let res = next.run(req).await;
//!         // inspect or replace `res` here
//!         res
//!     }
//! }
//! ```
//!
//! Built in:
//! - [`LatencyMiddleware`] — times each request and ships the latency to a
//!   metrics backend.

mod hooks;
mod latency;

pub use hooks::{DefaultHooks, Hooks, Measurement};
pub use latency::LatencyMiddleware;

use std::sync::Arc;

use async_trait::async_trait;

use crate::handler::BoxedHandler;
use crate::request::Request;
use crate::response::Response;

/// A unit of request processing that wraps everything after it.
#[async_trait]
pub trait Middleware: Send + Sync + 'static {
    async fn handle(&self, req: Request, next: Next<'_>) -> Response;
}

/// Keep an `Arc` to reconfigure a middleware after it has been installed.
#[async_trait]
impl<M: Middleware + ?Sized> Middleware for Arc<M> {
    async fn handle(&self, req: Request, next: Next<'_>) -> Response {
        (**self).handle(req, next).await
    }
}

/// The remainder of the chain: any middleware still to run, then the
/// routed handler.
pub struct Next<'a> {
    chain: &'a [Arc<dyn Middleware>],
    endpoint: &'a BoxedHandler,
}

impl<'a> Next<'a> {
    pub(crate) fn new(chain: &'a [Arc<dyn Middleware>], endpoint: &'a BoxedHandler) -> Self {
        Self { chain, endpoint }
    }

    /// Runs the rest of the chain to completion.
    pub async fn run(self, req: Request) -> Response {
        match self.chain.split_first() {
            Some((first, rest)) => first.handle(req, Next::new(rest, self.endpoint)).await,
            None => self.endpoint.call(req).await,
        }
    }
}
