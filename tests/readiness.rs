//! Readiness endpoint over a real socket.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use service_shell::health::{serve_readiness, ReadinessInfo};
use service_shell::Logger;

mod common;

#[tokio::test]
async fn info_endpoint_serves_until_cancelled() {
    let port = common::free_port();
    let ctx = CancellationToken::new();
    let info = ReadinessInfo::collect(Some("0a1b2c".into()));

    let handle = tokio::spawn(serve_readiness(ctx.clone(), port, info, Logger::nop()));
    common::wait_until_serving(port).await;

    let response = reqwest::get(common::url(port, "/_info")).await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["language"], "rust");
    assert_eq!(body["gitCommit"], "0a1b2c");
    assert!(body.get("ip").map_or(true, |ip| ip.is_string()));

    let profile = reqwest::get(common::url(port, "/debug/pprof/profile?seconds=999"))
        .await
        .unwrap();
    assert_eq!(profile.status(), reqwest::StatusCode::BAD_REQUEST);

    let missing = reqwest::get(common::url(port, "/nope")).await.unwrap();
    assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);

    ctx.cancel();
    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("readiness server should stop after cancellation")
        .unwrap();
    assert!(result.is_ok());
}
