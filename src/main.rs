//! service-shell demo binary.
//!
//! ```text
//!     Client Request
//!     ─────────────▶ net listener ─▶ http (panic guard, middleware, timeouts) ─▶ demo router
//!
//!     Background:   runtime sampler ─▶ Prometheus exporter
//!                   readiness endpoint (GET /_info, /debug/pprof/*)
//!
//!     Shutdown:     SIGINT / SIGTERM ─▶ drain connections ─▶ exit
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::{http::StatusCode, response::Response, routing::get, Router};
use clap::Parser;
use envconfig::Envconfig;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use service_shell::config::{resolve_config, EnvConfig};
use service_shell::health::{serve_readiness, ReadinessInfo};
use service_shell::http::{format_error, HttpListener, ListenerOptions};
use service_shell::observability::logging::init_tracing;
use service_shell::observability::metrics::init_metrics;
use service_shell::observability::runtime::{process_started, serve_runtime_metrics, SamplerOptions};
use service_shell::observability::{FacadeMetrics, Logger, Metrics, NopMetrics};

service_shell::counting_allocator!();

#[derive(Parser, Debug)]
#[command(name = "service-shell", version, about = "HTTP service runtime shell")]
struct Args {
    /// Path to a TOML config file.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    process_started();
    let args = Args::parse();
    let env = EnvConfig::init_from_env()?;
    let config = resolve_config(args.config.as_deref(), &env)?;

    init_tracing(&config.observability.log_filter);

    tracing::info!("service-shell v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        port = config.listener.port,
        max_connections = config.listener.max_connections,
        shutdown_timeout_secs = config.listener.shutdown_timeout_secs,
        "Configuration loaded"
    );

    let metrics: Arc<dyn Metrics> = match config.observability.metrics_address.parse::<SocketAddr>() {
        Ok(addr) if config.observability.metrics_enabled => {
            init_metrics(addr);
            Arc::new(FacadeMetrics)
        }
        _ => Arc::new(NopMetrics),
    };

    let ctx = CancellationToken::new();

    if config.runtime_metrics.enabled {
        let mut options = SamplerOptions::from_env(&env);
        if env.runtime_metrics_interval.is_none() {
            options = options.with_interval(Duration::from_secs(config.runtime_metrics.interval_secs));
        }
        tokio::spawn(serve_runtime_metrics(ctx.clone(), Arc::clone(&metrics), options));
    }

    if config.readiness.enabled {
        let info = ReadinessInfo::collect(env.git_commit.clone());
        let port = config.readiness.port;
        let token = ctx.clone();
        tokio::spawn(async move {
            if let Err(e) = serve_readiness(token, port, info, Logger::current()).await {
                tracing::error!(port, error = %e, "Readiness endpoint failed");
            }
        });
    }

    let listener = HttpListener::new(
        ListenerOptions::from_config(&config.listener)
            .with_logger(Logger::current())
            .with_metrics(Arc::clone(&metrics))
            .with_middleware(|router| router.layer(TraceLayer::new_for_http())),
    );

    let result = listener
        .listen(ctx.clone(), config.listener.port, demo_router())
        .await;
    ctx.cancel();

    match result {
        Ok(()) => {
            tracing::info!("Shutdown complete");
            Ok(())
        }
        Err(e) => {
            tracing::error!(error = %e, "Listener stopped");
            Err(e.into())
        }
    }
}

fn demo_router() -> Router {
    Router::new()
        .route("/", get(|| async { "service-shell" }))
        .route("/slow", get(slow))
        .route("/panic", get(panicking))
        .route("/error", get(failing))
}

async fn slow() -> &'static str {
    tokio::time::sleep(Duration::from_secs(5)).await;
    "done"
}

async fn panicking() -> &'static str {
    panic!("demo panic")
}

async fn failing() -> Response {
    format_error(StatusCode::BAD_REQUEST, "demo error")
}
