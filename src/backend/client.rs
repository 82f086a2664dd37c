//! HTTP delivery to a regional monitoring endpoint.
//!
//! # Retries
//!
//! The client, not the emitter, owns the retry policy. A failed attempt is
//! retried when the error is transient (transport failure, timeout, 5xx,
//! throttling), up to `max_retries` extra attempts. The delay doubles from
//! `base_delay` and is capped at `max_delay`:
//!
//! ```text
//! attempt 1 fails → sleep 30 ms
//! attempt 2 fails → sleep 60 ms
//! attempt 3 fails → sleep 120 ms
//! ...
//! ```
//!
//! Client errors (bad namespace, malformed datum) are returned after the
//! first attempt.
//!
//! # Signing
//!
//! Requests are sent unsigned. The regional endpoint rejects unsigned
//! calls, so without an `endpoint` override pointing at a signing proxy or a
//! local agent every emission fails; [`HttpBackend::new`] warns about this
//! once per process.

use std::sync::Once;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::{Request, StatusCode, Uri, header};
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{BackendError, MetricsBackend, PutMetricData};

const TARGET: &str = "GraniteServiceVersion20100801.PutMetricData";
const CONTENT_TYPE: &str = "application/x-amz-json-1.0";

static UNSIGNED_WARNING: Once = Once::new();

/// Settings for [`HttpBackend`].
#[derive(Clone, Debug)]
pub struct HttpBackendConfig {
    pub region: String,
    /// Overrides the endpoint derived from `region`.
    pub endpoint: Option<Uri>,
    pub max_retries: u32,
    /// Per-attempt timeout.
    pub timeout: Duration,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl HttpBackendConfig {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            endpoint: None,
            max_retries: 5,
            timeout: Duration::from_secs(10),
            base_delay: Duration::from_millis(30),
            max_delay: Duration::from_secs(5),
        }
    }

    pub fn with_endpoint(mut self, endpoint: Uri) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Whether requests would go straight to the regional endpoint, which
    /// only accepts signed requests.
    pub fn needs_signing_proxy(&self) -> bool {
        self.endpoint.is_none()
    }

    /// The endpoint requests go to, or `None` if the region does not form a
    /// valid host name.
    pub fn resolved_endpoint(&self) -> Option<Uri> {
        if let Some(endpoint) = &self.endpoint {
            return Some(endpoint.clone());
        }
        format!("http://monitoring.{}.amazonaws.com/", self.region).parse().ok()
    }
}

/// Sends each batch as one `PutMetricData` POST.
pub struct HttpBackend {
    client: Client<HttpConnector, Full<Bytes>>,
    endpoint: Option<Uri>,
    config: HttpBackendConfig,
}

impl HttpBackend {
    pub fn new(config: HttpBackendConfig) -> Self {
        let endpoint = config.resolved_endpoint();
        if endpoint.is_none() {
            warn!(region = %config.region, "no valid metrics endpoint for region; emissions will fail");
        } else if config.needs_signing_proxy() {
            UNSIGNED_WARNING.call_once(|| {
                warn!(
                    region = %config.region,
                    "metrics requests are unsigned; set an endpoint override that routes through a signing proxy or agent",
                );
            });
        }
        let client = Client::builder(TokioExecutor::new()).build_http();
        Self { client, endpoint, config }
    }

    pub fn config(&self) -> &HttpBackendConfig {
        &self.config
    }

    pub fn endpoint(&self) -> Option<&Uri> {
        self.endpoint.as_ref()
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.config.base_delay.saturating_mul(factor).min(self.config.max_delay)
    }

    async fn send_once(&self, endpoint: &Uri, body: Bytes) -> Result<(), BackendError> {
        let req = Request::post(endpoint.clone())
            .header(header::CONTENT_TYPE, CONTENT_TYPE)
            .header("x-amz-target", TARGET)
            .body(Full::new(body))
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        let exchange = async {
            let res = self.client.request(req).await
                .map_err(|e| BackendError::Transport(e.to_string()))?;
            let status = res.status();
            let bytes = res.into_body().collect().await
                .map_err(|e| BackendError::Transport(e.to_string()))?
                .to_bytes();

            if status.is_success() {
                Ok(())
            } else {
                Err(service_error(status, &bytes))
            }
        };

        tokio::time::timeout(self.config.timeout, exchange)
            .await
            .map_err(|_| BackendError::Timeout(self.config.timeout))?
    }
}

#[async_trait]
impl MetricsBackend for HttpBackend {
    async fn put_metric_data(&self, input: &PutMetricData) -> Result<(), BackendError> {
        let endpoint = self.endpoint.as_ref().ok_or_else(|| {
            BackendError::Transport(format!("no endpoint for region `{}`", self.config.region))
        })?;
        let body = Bytes::from(serde_json::to_vec(input)?);

        let mut attempt = 0;
        loop {
            match self.send_once(endpoint, body.clone()).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let delay = self.backoff(attempt);
                    attempt += 1;
                    debug!(attempt, ?delay, error = %e, "retrying PutMetricData");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(rename = "__type", default)]
    kind: Option<String>,
    #[serde(alias = "Message", default)]
    message: Option<String>,
}

/// Turns a non-2xx response into a structured error.
///
/// `__type` may be namespaced (`com.amazonaws#Throttling`); only the part
/// after `#` is kept.
fn service_error(status: StatusCode, body: &[u8]) -> BackendError {
    let parsed: Option<ErrorBody> = serde_json::from_slice(body).ok();
    let (kind, message) = match parsed {
        Some(b) => (b.kind, b.message),
        None => (None, None),
    };

    let code = match kind {
        Some(kind) => kind.rsplit('#').next().unwrap_or_default().to_owned(),
        None if status == StatusCode::TOO_MANY_REQUESTS => "Throttling".to_owned(),
        None if status == StatusCode::SERVICE_UNAVAILABLE => "ServiceUnavailable".to_owned(),
        None if status.is_server_error() => "InternalFailure".to_owned(),
        None => format!("Http{}", status.as_u16()),
    };
    let message = message.unwrap_or_else(|| String::from_utf8_lossy(body).into_owned());

    BackendError::Service { code, message }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use hyper::body::Incoming;
    use hyper::server::conn::http1;
    use hyper::service::service_fn;
    use hyper_util::rt::TokioIo;
    use tokio::net::TcpListener;

    use super::*;
    use crate::metric::{MetricDatum, Unit};

    fn input() -> PutMetricData {
        PutMetricData {
            namespace: "test".into(),
            metric_data: vec![MetricDatum::new("Latency", 10.0, Unit::Microseconds)],
        }
    }

    /// Serves `responses` in order (repeating the last one) and counts hits.
    async fn stub(responses: Vec<(u16, &'static str)>) -> (SocketAddr, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let responses = Arc::new(responses);

        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else { return };
                let counter = Arc::clone(&counter);
                let responses = Arc::clone(&responses);
                tokio::spawn(async move {
                    let svc = service_fn(move |req: http::Request<Incoming>| {
                        let counter = Arc::clone(&counter);
                        let responses = Arc::clone(&responses);
                        async move {
                            assert_eq!(req.headers()["x-amz-target"], TARGET);
                            let body = req.into_body().collect().await.unwrap().to_bytes();
                            let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
                            assert!(json["MetricData"][0]["Timestamp"].is_f64(), "timestamp must be epoch seconds");
                            let n = counter.fetch_add(1, Ordering::SeqCst);
                            let (status, body) = responses[n.min(responses.len() - 1)];
                            let res = http::Response::builder()
                                .status(status)
                                .body(Full::new(Bytes::from_static(body.as_bytes())))
                                .unwrap();
                            Ok::<_, Infallible>(res)
                        }
                    });
                    let _ = http1::Builder::new().serve_connection(TokioIo::new(stream), svc).await;
                });
            }
        });

        (addr, hits)
    }

    fn backend(addr: SocketAddr, max_retries: u32) -> HttpBackend {
        let endpoint: Uri = format!("http://{addr}/").parse().unwrap();
        HttpBackend::new(
            HttpBackendConfig::new("us-east-1")
                .with_endpoint(endpoint)
                .with_max_retries(max_retries)
                .with_base_delay(Duration::from_millis(1)),
        )
    }

    #[test]
    fn endpoint_from_region() {
        let config = HttpBackendConfig::new("eu-west-1");
        assert_eq!(config.max_retries, 5);
        assert_eq!(
            config.resolved_endpoint().unwrap().to_string(),
            "http://monitoring.eu-west-1.amazonaws.com/"
        );
        assert!(HttpBackendConfig::new("not a region").resolved_endpoint().is_none());
    }

    #[test]
    fn only_the_regional_endpoint_needs_a_signing_proxy() {
        let config = HttpBackendConfig::new("eu-west-1");
        assert!(config.needs_signing_proxy());

        let config = config.with_endpoint(Uri::from_static("http://127.0.0.1:4566/"));
        assert!(!config.needs_signing_proxy());
        assert_eq!(config.resolved_endpoint().unwrap().to_string(), "http://127.0.0.1:4566/");
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let backend = HttpBackend::new(HttpBackendConfig::new("us-east-1"));
        assert_eq!(backend.backoff(0), Duration::from_millis(30));
        assert_eq!(backend.backoff(1), Duration::from_millis(60));
        assert_eq!(backend.backoff(2), Duration::from_millis(120));
        assert_eq!(backend.backoff(20), Duration::from_secs(5));
        assert_eq!(backend.backoff(40), Duration::from_secs(5));
    }

    #[test]
    fn service_error_parsing() {
        let err = service_error(
            StatusCode::BAD_REQUEST,
            br#"{"__type":"com.amazonaws#InvalidParameterValue","message":"bad namespace"}"#,
        );
        assert_eq!(err.code(), Some("InvalidParameterValue"));
        assert!(err.to_string().contains("bad namespace"));

        let err = service_error(StatusCode::TOO_MANY_REQUESTS, b"slow down");
        assert_eq!(err.code(), Some("Throttling"));
        assert!(err.is_retryable());

        let err = service_error(StatusCode::BAD_GATEWAY, b"");
        assert_eq!(err.code(), Some("InternalFailure"));

        let err = service_error(StatusCode::FORBIDDEN, b"nope");
        assert_eq!(err.code(), Some("Http403"));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn retries_transient_failures() {
        let (addr, hits) = stub(vec![(500, ""), (503, ""), (200, "{}")]).await;
        backend(addr, 5).put_metric_data(&input()).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let (addr, hits) = stub(vec![(500, "")]).await;
        let err = backend(addr, 2).put_metric_data(&input()).await.unwrap_err();
        assert_eq!(err.code(), Some("InternalFailure"));
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let (addr, hits) = stub(vec![(
            400,
            r#"{"__type":"InvalidParameterValue","message":"bad namespace"}"#,
        )])
        .await;
        let err = backend(addr, 5).put_metric_data(&input()).await.unwrap_err();
        assert_eq!(err.code(), Some("InvalidParameterValue"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn connection_refused_is_transport() {
        // bind then drop to get a port nothing listens on
        let addr = TcpListener::bind("127.0.0.1:0").await.unwrap().local_addr().unwrap();
        let err = backend(addr, 0).put_metric_data(&input()).await.unwrap_err();
        assert!(matches!(err, BackendError::Transport(_)), "got {err:?}");
    }
}
