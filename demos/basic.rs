//! Latency middleware in front of a couple of JSON endpoints.
//!
//! Run with:
//!   RUST_LOG=latencywatch=debug cargo run --example basic
//!
//! Metrics go to `LATENCYWATCH_ENDPOINT` (or the regional endpoint for
//! `LATENCYWATCH_REGION`). Point it at anything that accepts a POST to watch
//! the payloads, or leave it unset and read the delivery errors in the log.
//!
//! Try:
//!   curl http://localhost:3000/users/42
//!   curl -X POST http://localhost:3000/checkout -H 'x-real-ip: 10.0.0.7'
//!   curl http://localhost:3000/healthz        # not measured

use std::sync::Arc;

use http::{Method, StatusCode};
use latencywatch::metric::{MetricDatum, Unit};
use latencywatch::{Config, LatencyMiddleware, MetricsHandle, Request, Response, Router, Server, health};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut config = Config::from_env();
    config.excluded_urls.extend(["/healthz".to_owned(), "/readyz".to_owned()]);

    let metrics = Arc::new(LatencyMiddleware::from_config(&config).expect("invalid config"));

    let app = Router::new()
        .on(Method::GET,  "/users/{id}", get_user)
        .on(Method::POST, "/checkout",   checkout)
        .on(Method::GET,  "/healthz",    health::liveness)
        .on(Method::GET,  "/readyz",     health::readiness)
        .wrap(Arc::clone(&metrics));

    Server::bind("0.0.0.0:3000")
        .serve(app)
        .await
        .expect("server error");
}

// GET /users/{id}
async fn get_user(req: Request) -> Response {
    let id = req.param("id").unwrap_or("unknown");
    Response::json(format!(r#"{{"id":"{id}","name":"alice"}}"#).into_bytes())
}

// POST /checkout — emits a custom metric alongside the latency datum
async fn checkout(req: Request) -> Response {
    if let Some(metrics) = req.extension::<MetricsHandle>() {
        let datum = MetricDatum::new("Checkouts", 1.0, Unit::Count)
            .with_dimension("Channel", "web");
        metrics.emit(vec![datum]).await;
    }

    Response::builder()
        .status(StatusCode::CREATED)
        .header("location", "/orders/99")
        .json(br#"{"order":"99"}"#.to_vec())
}
