use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::{Method, StatusCode};
use http_body_util::Full;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use latencywatch::backend::MemoryBackend;
use latencywatch::{Error, LatencyMiddleware, Request, Response, Router, Server};

struct Running {
    addr: SocketAddr,
    backend: MemoryBackend,
    shutdown: oneshot::Sender<()>,
    server: JoinHandle<Result<(), Error>>,
}

/// Serves `/stuff` behind the latency middleware on a loopback port.
async fn start() -> Running {
    let backend = MemoryBackend::new();
    let metrics = Arc::new(LatencyMiddleware::with_backend("test", Arc::new(backend.clone())));

    let app = Router::new()
        .on(Method::GET, "/stuff", |_req: Request| async { Response::status(StatusCode::IM_A_TEAPOT) })
        .wrap(metrics);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let server = Server::from_listener(listener).unwrap();
    let addr = server.local_addr();

    let (shutdown, signal) = oneshot::channel::<()>();
    let server = tokio::spawn(server.serve_with_shutdown(app, async move {
        let _ = signal.await;
    }));

    Running { addr, backend, shutdown, server }
}

impl Running {
    async fn stop(self) {
        self.shutdown.send(()).unwrap();
        let res = tokio::time::timeout(Duration::from_secs(5), self.server).await;
        assert!(matches!(res, Ok(Ok(Ok(())))), "server did not drain cleanly");
    }

    /// `(RequestURI, RemoteAddr)` of the single emitted datum.
    fn dimensions(&self) -> (String, String) {
        let requests = self.backend.requests();
        assert_eq!(requests.len(), 1);
        let datum = &requests[0].metric_data[0];
        (
            datum.dimension("RequestURI").unwrap().to_owned(),
            datum.dimension("RemoteAddr").unwrap().to_owned(),
        )
    }
}

async fn get(client: &Client<HttpConnector, Full<Bytes>>, addr: SocketAddr, real_ip: Option<&str>) -> StatusCode {
    let mut req = http::Request::get(format!("http://{addr}/stuff?rly=ya"));
    if let Some(ip) = real_ip {
        req = req.header("x-real-ip", ip);
    }
    let res = client.request(req.body(Full::new(Bytes::new())).unwrap()).await.unwrap();
    res.status()
}

#[tokio::test]
async fn http1_request_reports_origin_form_uri() {
    let running = start().await;
    let client = Client::builder(TokioExecutor::new()).build_http();

    let status = get(&client, running.addr, Some("10.10.10.10")).await;
    assert_eq!(status, StatusCode::IM_A_TEAPOT);
    assert_eq!(running.dimensions(), ("/stuff?rly=ya".to_owned(), "10.10.10.10".to_owned()));

    drop(client);
    running.stop().await;
}

#[tokio::test]
async fn http2_request_reports_origin_form_uri() {
    let running = start().await;
    let client = Client::builder(TokioExecutor::new()).http2_only(true).build_http();

    let status = get(&client, running.addr, Some("10.10.10.10")).await;
    assert_eq!(status, StatusCode::IM_A_TEAPOT);
    assert_eq!(running.dimensions(), ("/stuff?rly=ya".to_owned(), "10.10.10.10".to_owned()));

    drop(client);
    running.stop().await;
}

#[tokio::test]
async fn peer_address_is_used_without_real_ip() {
    let running = start().await;
    let client = Client::builder(TokioExecutor::new()).build_http();

    get(&client, running.addr, None).await;
    let (uri, remote) = running.dimensions();
    assert_eq!(uri, "/stuff?rly=ya");
    let peer: SocketAddr = remote.parse().unwrap();
    assert!(peer.ip().is_loopback());
    assert_ne!(peer.port(), running.addr.port());

    drop(client);
    running.stop().await;
}

#[tokio::test]
async fn shutdown_signal_stops_an_idle_server() {
    let running = start().await;
    assert_eq!(running.backend.call_count(), 0);
    running.stop().await;
}
