//! src/bin/backend.rs
//! Demo upstream server for manual testing of the balancer.
//! Run: cargo run --bin backend -- <port>
//!
//! Serves `GET /healthcheck` (200 while healthy, 503 otherwise; toggle with
//! `POST /healthcheck/set?healthy=false`) and greets on every other path.

use hyper::{
    service::{make_service_fn, service_fn},
    Body, Method, Request, Response, Server, StatusCode,
};
use std::{
    convert::Infallible,
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
};
use tracing::info;

#[derive(Clone)]
struct BackendState {
    port: u16,
    req_counter: Arc<AtomicU64>,
    healthy_flag: Arc<AtomicBool>,
}

async fn handle(req: Request<Body>, state: BackendState) -> Result<Response<Body>, Infallible> {
    let path = req.uri().path().to_owned();

    if path == "/healthcheck" && req.method() == Method::GET {
        if state.healthy_flag.load(Ordering::SeqCst) {
            return Ok(Response::new(Body::from("OK")));
        }
        return Ok(Response::builder()
            .status(StatusCode::SERVICE_UNAVAILABLE)
            .body(Body::from("Unhealthy"))
            .unwrap());
    }

    if path == "/healthcheck/set" && req.method() == Method::POST {
        let healthy = req
            .uri()
            .query()
            .map(|q| !q.contains("healthy=false"))
            .unwrap_or(true);
        state.healthy_flag.store(healthy, Ordering::SeqCst);
        info!(healthy, "health flag set");
        return Ok(Response::new(Body::from(format!("healthy={healthy}"))));
    }

    let n = state.req_counter.fetch_add(1, Ordering::SeqCst) + 1;
    Ok(Response::new(Body::from(format!(
        "Hello from server at :{}! (request #{})",
        state.port, n
    ))))
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().init();

    let port: u16 = std::env::args()
        .nth(1)
        .and_then(|p| p.parse().ok())
        .unwrap_or_else(|| {
            eprintln!("Invalid or missing port. Using 8080");
            8080
        });

    let state = BackendState {
        port,
        req_counter: Arc::new(AtomicU64::new(0)),
        healthy_flag: Arc::new(AtomicBool::new(true)),
    };

    let make_service = make_service_fn(move |_| {
        let state = state.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req| handle(req, state.clone())))
        }
    });

    let addr: SocketAddr = ([127, 0, 0, 1], port).into();
    info!("backend listening on {}", addr);

    let server = Server::bind(&addr)
        .serve(make_service)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        });

    if let Err(e) = server.await {
        eprintln!("backend error: {e}");
    }
}
