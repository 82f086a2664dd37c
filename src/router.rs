//! Radix-tree request router with a middleware chain in front.
//!
//! One tree per HTTP method. O(path-length) lookup. Routing happens first,
//! then the request travels through the middleware in the order it was
//! wrapped, then reaches the handler:
//!
//! ```text
//! request ──► lookup ──► mw[0] ──► mw[1] ──► … ──► handler (or 404)
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use http::{Method, StatusCode};
use matchit::Router as MatchitRouter;

use crate::handler::{BoxedHandler, Handler};
use crate::middleware::{Middleware, Next};
use crate::request::Request;
use crate::response::Response;

/// The application router.
///
/// Build it once at startup; pass it to [`Server::serve`](crate::Server::serve).
pub struct Router {
    routes: HashMap<Method, MatchitRouter<BoxedHandler>>,
    middleware: Vec<Arc<dyn Middleware>>,
    not_found: BoxedHandler,
}

impl Router {
    pub fn new() -> Self {
        Self {
            routes: HashMap::new(),
            middleware: Vec::new(),
            not_found: not_found.into_boxed_handler(),
        }
    }

    /// Register a handler for a method + path pair. Returns `self` for chaining.
    ///
    /// Path parameters use `{name}` syntax — `req.param("name")` retrieves them:
    ///
    /// ```rust,no_run
    /// # use http::Method;
    /// # use latencywatch::{Request, Response, Router};
    /// # async fn get_user(_: Request) -> Response { Response::text("") }
    /// # async fn create_user(_: Request) -> Response { Response::text("") }
    /// Router::new()
    ///     .on(Method::GET,  "/users/{id}", get_user)
    ///     .on(Method::POST, "/users",      create_user);
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if `path` is not a valid route or conflicts with an existing one.
    pub fn on(mut self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.routes
            .entry(method)
            .or_default()
            .insert(path, handler.into_boxed_handler())
            .unwrap_or_else(|e| panic!("invalid route `{path}`: {e}"));
        self
    }

    /// Adds a middleware. The first one wrapped is the outermost.
    ///
    /// Unmatched requests go through the middleware too, on their way to
    /// the built-in 404 handler.
    pub fn wrap(mut self, middleware: impl Middleware) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    /// Routes `req` through the middleware chain to its handler.
    pub async fn handle(&self, mut req: Request) -> Response {
        let endpoint = match self.lookup(&req.method, req.uri.path()) {
            Some((handler, params)) => {
                req.params = params;
                handler
            }
            None => Arc::clone(&self.not_found),
        };

        Next::new(&self.middleware, &endpoint).run(req).await
    }

    fn lookup(&self, method: &Method, path: &str) -> Option<(BoxedHandler, HashMap<String, String>)> {
        let tree = self.routes.get(method)?;
        let matched = tree.at(path).ok()?;
        let handler = Arc::clone(matched.value);
        let params = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some((handler, params))
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

async fn not_found(_req: Request) -> Response {
    Response::status(StatusCode::NOT_FOUND)
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;

    async fn user(req: Request) -> Response {
        Response::text(req.param("id").unwrap_or("none").to_owned())
    }

    struct Tag(&'static str);

    #[async_trait]
    impl Middleware for Tag {
        async fn handle(&self, req: Request, next: Next<'_>) -> Response {
            let res = next.run(req).await;
            let mut body = res.body().to_vec();
            body.extend_from_slice(self.0.as_bytes());
            Response::builder().status(res.status_code()).text(String::from_utf8(body).unwrap())
        }
    }

    #[tokio::test]
    async fn routes_with_params() {
        let app = Router::new().on(Method::GET, "/users/{id}", user);
        let res = app.handle(Request::builder().uri("/users/42").build()).await;
        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(res.body(), b"42");
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let app = Router::new().on(Method::GET, "/users/{id}", user);
        let res = app.handle(Request::builder().uri("/nope").build()).await;
        assert_eq!(res.status_code(), StatusCode::NOT_FOUND);

        let res = app
            .handle(Request::builder().method(Method::DELETE).uri("/users/1").build())
            .await;
        assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn first_wrapped_is_outermost() {
        let app = Router::new()
            .on(Method::GET, "/users/{id}", user)
            .wrap(Tag("-outer"))
            .wrap(Tag("-inner"));
        let res = app.handle(Request::builder().uri("/users/7").build()).await;
        assert_eq!(res.body(), b"7-inner-outer");
    }
}
