//! CPU profiling endpoints.
//!
//! Mounted next to the readiness endpoint:
//! - `GET /debug/pprof/profile`: gzipped pprof protobuf
//! - `GET /debug/pprof/flamegraph`: gzipped SVG flamegraph
//!
//! Both sample the whole process for `seconds` (default 10) at `frequency`
//! Hz (default 200). Only one profile can run at a time; a second request
//! fails with 500 while one is in progress.
//!
//! ```text
//! curl -sS "http://localhost:8081/debug/pprof/profile?seconds=30" > cpu.pb.gz
//! go tool pprof -http :8000 cpu.pb.gz
//! ```

use std::io::{self, Write};
use std::time::Duration;

use axum::{
    extract::Query,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use flate2::write::GzEncoder;
use flate2::Compression;
use pprof::{flamegraph::Options, protos::Message, ProfilerGuard, ProfilerGuardBuilder};
use serde::Deserialize;

use crate::http::format_error;

pub const PROFILE_PATH: &str = "/debug/pprof/profile";
pub const FLAMEGRAPH_PATH: &str = "/debug/pprof/flamegraph";

const DEFAULT_SECONDS: u64 = 10;
/// Longest accepted sampling window.
pub const MAX_PROFILE_SECONDS: u64 = 300;
const DEFAULT_FREQUENCY: i32 = 200;
const DEFAULT_IMAGE_WIDTH: usize = 2500;

#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error("profiler: {0}")]
    Profiler(#[from] pprof::Error),

    #[error("encoding profile: {0}")]
    Encode(String),

    #[error("compressing profile: {0}")]
    Compress(#[from] io::Error),
}

#[derive(Debug, Default, Deserialize)]
pub struct ProfileParams {
    /// Sampling window.
    pub seconds: Option<u64>,
    /// Sampling frequency in Hz.
    pub frequency: Option<i32>,
    /// Flamegraph SVG width.
    pub image_width: Option<usize>,
}

impl ProfileParams {
    fn window(&self) -> Result<Duration, String> {
        match self.seconds.unwrap_or(DEFAULT_SECONDS) {
            s if s > MAX_PROFILE_SECONDS => Err(format!(
                "seconds must be at most {MAX_PROFILE_SECONDS}, got {s}"
            )),
            s => Ok(Duration::from_secs(s)),
        }
    }

    fn frequency(&self) -> Result<i32, String> {
        match self.frequency.unwrap_or(DEFAULT_FREQUENCY) {
            f if f <= 0 => Err(format!("frequency must be positive, got {f}")),
            f => Ok(f),
        }
    }

    fn settings(&self) -> Result<(Duration, i32), String> {
        Ok((self.window()?, self.frequency()?))
    }
}

/// Routes serving CPU profiles of this process.
pub fn profiler_router() -> Router {
    Router::new()
        .route(PROFILE_PATH, get(profile_handler))
        .route(FLAMEGRAPH_PATH, get(flamegraph_handler))
}

async fn profile_handler(Query(params): Query<ProfileParams>) -> Response {
    let (window, frequency) = match params.settings() {
        Ok(settings) => settings,
        Err(reason) => return format_error(StatusCode::BAD_REQUEST, reason),
    };
    respond(profile(window, frequency).await)
}

async fn flamegraph_handler(Query(params): Query<ProfileParams>) -> Response {
    let (window, frequency) = match params.settings() {
        Ok(settings) => settings,
        Err(reason) => return format_error(StatusCode::BAD_REQUEST, reason),
    };
    let width = params.image_width.unwrap_or(DEFAULT_IMAGE_WIDTH);
    respond(flamegraph(window, frequency, width).await)
}

fn respond(result: Result<Vec<u8>, ProfileError>) -> Response {
    match result {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/octet-stream")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "CPU profile failed");
            format_error(StatusCode::INTERNAL_SERVER_ERROR, e)
        }
    }
}

async fn sample(window: Duration, frequency: i32) -> Result<ProfilerGuard<'static>, ProfileError> {
    let guard = ProfilerGuardBuilder::default()
        .frequency(frequency)
        .blocklist(&["libc", "libgcc", "pthread", "vdso"])
        .build()?;
    tokio::time::sleep(window).await;
    Ok(guard)
}

/// Sample for `window` and return the gzipped pprof protobuf.
pub async fn profile(window: Duration, frequency: i32) -> Result<Vec<u8>, ProfileError> {
    let guard = sample(window, frequency).await?;
    let profile = guard.report().build()?.pprof()?;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    profile
        .write_to_writer(&mut encoder)
        .map_err(|e| ProfileError::Encode(e.to_string()))?;
    Ok(encoder.finish()?)
}

/// Sample for `window` and return a gzipped flamegraph SVG.
pub async fn flamegraph(
    window: Duration,
    frequency: i32,
    image_width: usize,
) -> Result<Vec<u8>, ProfileError> {
    let guard = sample(window, frequency).await?;

    let mut options = Options::default();
    options.image_width = Some(image_width);
    let mut svg = Vec::new();
    guard
        .report()
        .build()?
        .flamegraph_with_options(&mut svg, &mut options)?;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&svg)?;
    Ok(encoder.finish()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    async fn get_status(uri: &str) -> (StatusCode, Vec<u8>) {
        let response = profiler_router()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, body.to_vec())
    }

    #[test]
    fn params_are_bounded() {
        let defaults = ProfileParams::default();
        assert_eq!(defaults.window(), Ok(Duration::from_secs(DEFAULT_SECONDS)));
        assert_eq!(defaults.frequency(), Ok(DEFAULT_FREQUENCY));

        let too_long = ProfileParams {
            seconds: Some(MAX_PROFILE_SECONDS + 1),
            ..ProfileParams::default()
        };
        assert!(too_long.window().is_err());

        let zero_hz = ProfileParams {
            frequency: Some(0),
            ..ProfileParams::default()
        };
        assert!(zero_hz.frequency().is_err());
    }

    #[tokio::test]
    async fn invalid_queries_are_rejected() {
        let (status, _) = get_status("/debug/pprof/profile?seconds=abc").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = get_status("/debug/pprof/flamegraph?seconds=301").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(String::from_utf8_lossy(&body).contains("at most 300"));
    }

    #[cfg(target_os = "linux")]
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn profile_returns_gzipped_protobuf() {
        let (status, body) = get_status("/debug/pprof/profile?seconds=1&frequency=99").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(&body[..2], &[0x1f, 0x8b], "gzip magic");
    }
}
