//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::{extract::Path, routing::get, Router};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use service_shell::{HttpListener, ListenError};

/// A port that was free a moment ago.
pub fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Wait until something accepts TCP connections on `port`.
pub async fn wait_until_serving(port: u16) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if TcpStream::connect(("127.0.0.1", port)).await.is_ok() {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "nothing listening on port {port}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Wait until connections to `port` are refused.
pub async fn wait_until_closed(port: u16) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if TcpStream::connect(("127.0.0.1", port)).await.is_err() {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "port {port} still accepting connections"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// `/` answers `ok`, `/slow/{ms}` sleeps first, `/panic` panics.
pub fn test_router() -> Router {
    Router::new()
        .route("/", get(|| async { "ok" }))
        .route("/slow/{ms}", get(slow))
        .route("/panic", get(panicking))
}

async fn slow(Path(ms): Path<u64>) -> &'static str {
    tokio::time::sleep(Duration::from_millis(ms)).await;
    "done"
}

async fn panicking() -> &'static str {
    panic!("handler exploded")
}

/// Run a listen cycle in the background.
pub fn spawn_listen(
    listener: Arc<HttpListener>,
    ctx: CancellationToken,
    port: u16,
) -> JoinHandle<Result<(), ListenError>> {
    tokio::spawn(async move { listener.listen(ctx, port, test_router()).await })
}

pub fn url(port: u16, path: &str) -> String {
    format!("http://127.0.0.1:{port}{path}")
}
