//! Before/after extension points for [`LatencyMiddleware`].
//!
//! Both methods of [`Hooks`] have default bodies, so an implementation can
//! replace just one of them. [`DefaultHooks`] keeps both defaults.
//!
//! | Hook | Runs | Default |
//! |---|---|---|
//! | `before` | after the exclusion check, before the handler | puts a [`MetricsHandle`] into the request |
//! | `after` | once the handler has returned | emits one `Latency` datum, closes the request scope |
//!
//! Overriding `after` without calling [`LatencyMiddleware::emit`] turns
//! latency emission off while keeping whatever else the hook does.

use std::time::Duration;

use async_trait::async_trait;
use http::{Method, StatusCode};

use super::LatencyMiddleware;
use crate::emitter::{MetricsHandle, RequestScope};
use crate::request::Request;
use crate::response::Response;

/// What the middleware observed about one instrumented request.
#[derive(Clone, Debug)]
pub struct Measurement {
    pub method: Method,
    /// Request-target as received, query included.
    pub request_uri: String,
    pub path: String,
    /// `X-Real-IP` when present and non-empty, else the peer address.
    pub client_addr: String,
    pub elapsed: Duration,
    pub status: StatusCode,
}

impl Measurement {
    pub fn elapsed_micros(&self) -> f64 {
        self.elapsed.as_nanos() as f64 / 1_000.0
    }
}

/// Pre- and post-dispatch hooks.
#[async_trait]
pub trait Hooks: Send + Sync {
    /// Runs before the handler.
    ///
    /// The default makes the request's [`MetricsHandle`] available to the
    /// handler through [`Request::extension`].
    #[allow(unused_variables)]
    fn before(&self, mw: &LatencyMiddleware, req: &mut Request, scope: &RequestScope, client_addr: &str) {
        req.extensions_mut().insert::<MetricsHandle>(scope.handle());
    }

    /// Runs after the handler has produced `res`.
    ///
    /// The default emits [`LatencyMiddleware::latency_datum`] as a
    /// one-element batch, then closes `scope`.
    #[allow(unused_variables)]
    async fn after(&self, mw: &LatencyMiddleware, measurement: &Measurement, res: &Response, scope: &RequestScope) {
        mw.emit(vec![mw.latency_datum(measurement)]).await;
        scope.close();
    }
}

/// The stock hooks.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultHooks;

impl Hooks for DefaultHooks {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_micros_is_fractional() {
        let m = Measurement {
            method: Method::GET,
            request_uri: "/".into(),
            path: "/".into(),
            client_addr: "127.0.0.1:1".into(),
            elapsed: Duration::from_nanos(10_500),
            status: StatusCode::OK,
        };
        assert_eq!(m.elapsed_micros(), 10.5);
    }
}
