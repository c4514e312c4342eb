//! SIGTERM with a request outliving the shutdown timeout.
//!
//! Kept in its own test binary: the signal goes to the whole process.

#![cfg(unix)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use service_shell::{HttpListener, ListenError, ListenerOptions};

mod common;

#[tokio::test]
async fn slow_request_turns_sigterm_into_timeout() {
    let listener = Arc::new(HttpListener::new(
        ListenerOptions::new().with_shutdown_timeout(Duration::from_secs(2)),
    ));
    let port = common::free_port();
    let ctx = CancellationToken::new();

    let handle = common::spawn_listen(listener, ctx.clone(), port);
    common::wait_until_serving(port).await;

    let _request = tokio::spawn(reqwest::get(common::url(port, "/slow/5000")));
    tokio::time::sleep(Duration::from_millis(200)).await;

    let signalled_at = Instant::now();
    let status = std::process::Command::new("kill")
        .args(["-TERM", &std::process::id().to_string()])
        .status()
        .unwrap();
    assert!(status.success());

    let result = handle.await.unwrap();
    let elapsed = signalled_at.elapsed();

    assert!(
        matches!(result, Err(ListenError::ShutdownTimeout(limit)) if limit == Duration::from_secs(2)),
        "unexpected result {result:?}"
    );
    assert!(elapsed >= Duration::from_millis(1800), "returned after {elapsed:?}");
    assert!(elapsed < Duration::from_secs(4), "returned after {elapsed:?}");
}
