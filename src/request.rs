//! Incoming HTTP request type.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use http::{Extensions, Method, Uri};

/// An incoming HTTP request.
///
/// Besides the usual parts it carries the transport-level peer address and
/// a per-request [`Extensions`] map. Middleware uses the extensions to hand
/// request-scoped values (like a [`MetricsHandle`](crate::MetricsHandle))
/// to the handler; they die with the request.
pub struct Request {
    pub(crate) method: Method,
    pub(crate) uri: Uri,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) body: Vec<u8>,
    pub(crate) params: HashMap<String, String>,
    pub(crate) remote_addr: SocketAddr,
    pub(crate) extensions: Extensions,
}

impl Request {
    /// Starts building a request by hand, for tests and embedders.
    ///
    /// ```rust
    /// use latencywatch::Request;
    ///
    /// let req = Request::builder()
    ///     .uri("/stuff?rly=ya")
    ///     .header("x-real-ip", "10.10.10.10")
    ///     .build();
    /// assert_eq!(req.path(), "/stuff");
    /// assert_eq!(req.request_uri(), "/stuff?rly=ya");
    /// ```
    pub fn builder() -> RequestBuilder {
        RequestBuilder {
            method: Method::GET,
            uri: Uri::from_static("/"),
            headers: Vec::new(),
            body: Vec::new(),
            remote_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0),
        }
    }

    pub fn method(&self) -> &Method { &self.method }
    pub fn uri(&self) -> &Uri { &self.uri }
    pub fn path(&self) -> &str { self.uri.path() }
    pub fn headers(&self) -> &[(String, String)] { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }

    /// The transport-level peer address.
    pub fn remote_addr(&self) -> SocketAddr { self.remote_addr }

    /// The request-target in origin form (`/stuff?rly=ya`).
    ///
    /// HTTP/2 requests arrive with an absolute URI; scheme and authority are
    /// dropped so both protocols report the same value.
    pub fn request_uri(&self) -> String {
        self.uri.path_and_query()
            .map_or_else(|| self.uri.path(), |pq| pq.as_str())
            .to_owned()
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Returns a request-scoped value inserted by middleware.
    pub fn extension<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.extensions.get::<T>()
    }

    pub fn extensions(&self) -> &Extensions { &self.extensions }
    pub fn extensions_mut(&mut self) -> &mut Extensions { &mut self.extensions }
}

/// Hand-rolled [`Request`] construction. Obtain via [`Request::builder`].
pub struct RequestBuilder {
    method: Method,
    uri: Uri,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
    remote_addr: SocketAddr,
}

impl RequestBuilder {
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// # Panics
    ///
    /// Panics if `uri` does not parse.
    pub fn uri(mut self, uri: &str) -> Self {
        self.uri = uri.parse().unwrap_or_else(|e| panic!("invalid uri `{uri}`: {e}"));
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = addr;
        self
    }

    pub fn build(self) -> Request {
        Request {
            method: self.method,
            uri: self.uri,
            headers: self.headers,
            body: self.body,
            params: HashMap::new(),
            remote_addr: self.remote_addr,
            extensions: Extensions::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_uri_keeps_the_query() {
        let req = Request::builder().uri("/stuff?rly=ya").build();
        assert_eq!(req.request_uri(), "/stuff?rly=ya");
    }

    #[test]
    fn request_uri_drops_scheme_and_authority() {
        let req = Request::builder().uri("http://127.0.0.1:3000/stuff?rly=ya").build();
        assert_eq!(req.request_uri(), "/stuff?rly=ya");
        assert_eq!(req.path(), "/stuff");

        let req = Request::builder().uri("https://example.com").build();
        assert_eq!(req.request_uri(), "/");
    }
}
