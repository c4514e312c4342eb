//! Readiness endpoint.
//!
//! # Responsibilities
//! - Describe the running process (address, host, OS, toolchain, commit)
//! - Serve that description as JSON on `GET /_info` until the context ends
//! - Carry the CPU profiling routes on the same port
//!
//! # Design Decisions
//! - Facts are gathered once at startup; the endpoint never blocks on I/O
//! - Unknown facts are omitted rather than reported empty

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use sysinfo::{Networks, System};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use super::profiler::profiler_router;
use crate::observability::runtime::stats::local_hostname;
use crate::observability::Logger;

/// Path of the readiness endpoint.
pub const READINESS_PATH: &str = "/_info";

/// Port used when `READINESS_PORT` is unset.
pub const DEFAULT_READINESS_PORT: u16 = 8081;

/// Body of the readiness endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReadinessInfo {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub ip: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub host: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub os: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub language: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub language_version: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub git_commit: String,
}

impl ReadinessInfo {
    /// Gather facts about this process.
    pub fn collect(git_commit: Option<String>) -> Self {
        Self {
            ip: interface_addresses(),
            host: local_hostname().unwrap_or_default(),
            os: os_description(),
            language: "rust".to_owned(),
            language_version: env!("CARGO_PKG_RUST_VERSION").to_owned(),
            git_commit: git_commit.unwrap_or_default(),
        }
    }
}

/// Non-loopback addresses of the host's interfaces, space separated.
fn interface_addresses() -> String {
    let networks = Networks::new_with_refreshed_list();
    let mut interfaces: Vec<_> = networks.iter().collect();
    interfaces.sort_by(|a, b| a.0.cmp(b.0));

    let mut addresses: Vec<IpAddr> = Vec::new();
    for (_, data) in interfaces {
        for network in data.ip_networks() {
            let ip = network.addr;
            if !ip.is_loopback() && !ip.is_unspecified() && !addresses.contains(&ip) {
                addresses.push(ip);
            }
        }
    }
    join_addresses(&addresses)
}

/// IPv4 first, in discovery order.
fn join_addresses(addresses: &[IpAddr]) -> String {
    let (v4, v6): (Vec<IpAddr>, Vec<IpAddr>) = addresses.iter().partition(|ip| ip.is_ipv4());
    v4.iter()
        .chain(&v6)
        .map(IpAddr::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

/// OS name, kernel release, OS version and machine, two spaces apart.
fn os_description() -> String {
    join_os_parts([
        System::name(),
        System::kernel_version(),
        System::os_version(),
        Some(std::env::consts::ARCH.to_owned()),
    ])
}

fn join_os_parts(parts: [Option<String>; 4]) -> String {
    parts
        .into_iter()
        .flatten()
        .map(|part| part.trim().to_owned())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("  ")
}

/// Router answering `GET /_info` and the CPU profiling routes.
pub fn readiness_router(info: ReadinessInfo) -> Router {
    Router::new()
        .route(READINESS_PATH, get(readiness_handler))
        .with_state(Arc::new(info))
        .merge(profiler_router())
}

async fn readiness_handler(State(info): State<Arc<ReadinessInfo>>) -> Response {
    match serde_json::to_string_pretty(&*info) {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            body,
        )
            .into_response(),
        Err(e) => crate::http::format_error(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

/// Serve the readiness endpoint on `0.0.0.0:port` until `ctx` is cancelled.
pub async fn serve_readiness(
    ctx: CancellationToken,
    port: u16,
    info: ReadinessInfo,
    logger: Logger,
) -> io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;

    logger.in_scope(|| tracing::info!("serving readiness endpoint on {}", addr));

    logger
        .attach(async move {
            axum::serve(listener, readiness_router(info))
                .with_graceful_shutdown(ctx.cancelled_owned())
                .await
        })
        .await?;

    logger.in_scope(|| tracing::debug!(address = %addr, "readiness endpoint stopped"));
    Ok(())
}
