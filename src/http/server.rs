//! HTTP listener lifecycle.
//!
//! # Responsibilities
//! - Compose the service: panic guard, user middleware, write timeout,
//!   panic-to-500 conversion
//! - Bind and run a bounded accept loop, one task per connection
//! - Race server fault, termination signal and context cancellation
//! - Drain connections within the shutdown timeout and report the outcome

use std::any::Any;
use std::future;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::StatusCode,
    response::{IntoResponse, Response},
    Router,
};
use envconfig::Envconfig;
use hyper::body::Incoming;
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::server::conn::auto::Builder as AutoBuilder;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::timeout::TimeoutLayer;

use crate::config::EnvConfig;
use crate::http::error_log::ErrorLog;
use crate::http::middleware::{panic_message, PanicGuard};
use crate::http::options::ListenerOptions;
use crate::lifecycle::{drain_within, DrainTimedOut, Shutdown, ShutdownTrigger, TerminationSignals};
use crate::net::connection::ConnectionId;
use crate::net::{ConnectionActivity, ConnectionTracker, Listener};
use crate::observability::Logger;
use crate::resilience::accept_backoff;

/// Port used by [`serve_from_env`] when `SERVICE_PORT` is unset.
pub const DEFAULT_SERVICE_PORT: u16 = 8080;

/// hyper refuses HTTP/1 read buffers smaller than this.
const MIN_READ_BUF_SIZE: usize = 8192;

/// Why a listen cycle did not end cleanly.
#[derive(Debug, Error)]
pub enum ListenError {
    /// The server could not start.
    #[error("server error: {0}")]
    Server(#[source] io::Error),

    /// Connections were still open when the shutdown timeout elapsed.
    #[error("graceful shutdown did not finish within {0:?}")]
    ShutdownTimeout(Duration),

    /// The caller's context was cancelled.
    #[error("listen context cancelled")]
    Cancelled,

    #[error("failed to register signal handlers: {0}")]
    Signals(#[source] io::Error),

    #[error("listener is already serving")]
    AlreadyListening,

    #[error("invalid environment: {0}")]
    Environment(#[from] envconfig::Error),
}

/// Runs an axum [`Router`] until a server fault, SIGINT/SIGTERM or
/// cancellation of the caller's context, then drains it.
#[derive(Debug)]
pub struct HttpListener {
    options: ListenerOptions,
    error_log: ErrorLog,
    listening: AtomicBool,
}

/// Clears the in-use flag when a listen cycle ends, whatever the exit path.
struct CycleGuard<'a>(&'a AtomicBool);

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Debug, Clone, Copy)]
struct ConnectionSettings {
    read_timeout: Duration,
    idle_timeout: Duration,
    max_header_bytes: usize,
}

struct ServeTask {
    app: Router,
    addr: SocketAddr,
    max_connections: usize,
    settings: ConnectionSettings,
    stop: CancellationToken,
    tracker: ConnectionTracker,
    error_log: ErrorLog,
    logger: Logger,
}

impl HttpListener {
    pub fn new(options: ListenerOptions) -> Self {
        let error_log = ErrorLog::new(options.configured_logger().cloned());
        Self {
            options,
            error_log,
            listening: AtomicBool::new(false),
        }
    }

    pub fn options(&self) -> &ListenerOptions {
        &self.options
    }

    /// Wrap `handler` in the panic guard (innermost), the user middleware
    /// (first registered outermost), the write timeout and the
    /// panic-to-500 conversion (outermost).
    #[allow(deprecated)]
    pub fn compose(&self, handler: Router) -> Router {
        let mut app = PanicGuard::new(self.options.logger(), self.options.metrics()).wrap(handler);

        for middleware in self.options.middlewares().iter().rev() {
            app = middleware(app);
        }

        let write_timeout = self.options.write_timeout();
        if !write_timeout.is_zero() {
            app = app.layer(TimeoutLayer::new(write_timeout));
        }

        let error_log = self.error_log.clone();
        app.layer(CatchPanicLayer::custom(
            move |payload: Box<dyn Any + Send + 'static>| -> Response {
                error_log.write(&format!(
                    "http: panic serving request: {}",
                    panic_message(&*payload)
                ));
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            },
        ))
    }

    /// Serve `handler` on `0.0.0.0:port` until the first termination source
    /// fires, then shut down gracefully.
    ///
    /// Returns `Ok(())` after a signal-triggered shutdown,
    /// [`ListenError::Server`] when the server could not start,
    /// [`ListenError::Cancelled`] when `ctx` was cancelled, and
    /// [`ListenError::ShutdownTimeout`] whenever the drain outlived the
    /// shutdown timeout.
    pub async fn listen(
        &self,
        ctx: CancellationToken,
        port: u16,
        handler: Router,
    ) -> Result<(), ListenError> {
        if self
            .listening
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ListenError::AlreadyListening);
        }
        let _cycle = CycleGuard(&self.listening);

        let logger = self.options.logger();
        let metrics = self.options.metrics();

        let mut signals = TerminationSignals::register().map_err(ListenError::Signals)?;

        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let shutdown = Shutdown::new();
        // stops the serve task even when this future is dropped mid-cycle
        let _stop_on_exit = shutdown.subscribe().drop_guard();
        let tracker = ConnectionTracker::new();
        let (fault_tx, fault_rx) = oneshot::channel();

        let task = ServeTask {
            app: self.compose(handler),
            addr,
            max_connections: self.options.max_connections(),
            settings: ConnectionSettings {
                read_timeout: self.options.read_timeout(),
                idle_timeout: self.options.idle_timeout(),
                max_header_bytes: self.options.max_header_bytes(),
            },
            stop: shutdown.subscribe(),
            tracker: tracker.clone(),
            error_log: self.error_log.clone(),
            logger: logger.clone(),
        };
        let server = tokio::spawn(logger.attach(serve(task, fault_tx)));

        logger.in_scope(|| tracing::info!("serving app on {}", addr));

        let trigger = tokio::select! {
            Ok(e) = fault_rx => ShutdownTrigger::ServerFault(e),
            signal = signals.recv() => ShutdownTrigger::Signal(signal),
            _ = ctx.cancelled() => ShutdownTrigger::ContextCancelled,
        };
        drop(signals);

        logger.in_scope(|| tracing::info!(trigger = %trigger, "shutting down server"));
        metrics.increment(&trigger.metric_key());

        shutdown.trigger();
        let drained = drain_within(self.options.shutdown_timeout(), async {
            if let Err(e) = server.await {
                self.error_log.write(&format!("http: serve task failed: {}", e));
            }
            tracker.wait_for_shutdown().await;
        })
        .await;

        match drained {
            Err(DrainTimedOut(limit)) => {
                logger.in_scope(|| {
                    tracing::error!(
                        timeout = ?limit,
                        open_connections = tracker.active_count(),
                        "graceful shutdown timed out"
                    )
                });
                Err(ListenError::ShutdownTimeout(limit))
            }
            Ok(()) => {
                logger.in_scope(|| tracing::info!("server stopped"));
                match trigger {
                    ShutdownTrigger::ServerFault(e) => Err(ListenError::Server(e)),
                    ShutdownTrigger::Signal(_) => Ok(()),
                    ShutdownTrigger::ContextCancelled => Err(ListenError::Cancelled),
                }
            }
        }
    }
}

/// Listen on `SERVICE_PORT` (default 8080).
pub async fn serve_from_env(
    ctx: CancellationToken,
    listener: &HttpListener,
    handler: Router,
) -> Result<(), ListenError> {
    let env = EnvConfig::init_from_env()?;
    let port = env.service_port.unwrap_or(DEFAULT_SERVICE_PORT);
    listener.listen(ctx, port, handler).await
}

/// Bind, then accept until `stop` fires. A bind failure goes to `fault`.
async fn serve(task: ServeTask, fault: oneshot::Sender<io::Error>) {
    let listener = match Listener::bind(task.addr, task.max_connections).await {
        Ok(listener) => listener,
        Err(e) => {
            let _ = fault.send(e.into_io());
            return;
        }
    };
    drop(fault);

    let mut failures: u32 = 0;
    loop {
        let accepted = tokio::select! {
            biased;
            _ = task.stop.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, peer, permit)) => {
                failures = 0;
                if let Err(e) = stream.set_nodelay(true) {
                    tracing::warn!(peer_addr = %peer, error = %e, "failed to set TCP_NODELAY");
                }

                let guard = task.tracker.track();
                let connection = serve_connection(
                    stream,
                    peer,
                    guard.id(),
                    task.app.clone(),
                    task.settings,
                    task.stop.clone(),
                    task.error_log.clone(),
                );
                tokio::spawn(task.logger.attach(async move {
                    let _permit = permit;
                    let _guard = guard;
                    connection.await;
                }));
            }
            Err(e) => {
                failures = failures.saturating_add(1);
                let delay = accept_backoff(failures);
                task.error_log
                    .write(&format!("http: Accept error: {}; retrying in {:?}", e, delay));
                tokio::select! {
                    biased;
                    _ = task.stop.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }

    tracing::debug!(address = %task.addr, "accept loop stopped");
}

/// Serve one connection until the client closes it, the server stops or it
/// sits idle past the idle timeout. Stop and idle both close gracefully:
/// the in-flight request finishes first.
async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    id: ConnectionId,
    app: Router,
    settings: ConnectionSettings,
    stop: CancellationToken,
    error_log: ErrorLog,
) {
    tracing::trace!(connection_id = %id, peer_addr = %peer, "serving connection");

    let activity = Arc::new(ConnectionActivity::new());
    let service = {
        let activity = Arc::clone(&activity);
        hyper::service::service_fn(move |req: hyper::Request<Incoming>| {
            let request = activity.begin();
            let app = app.clone();
            async move {
                let _request = request;
                app.oneshot(req.map(Body::new)).await
            }
        })
    };

    let mut builder = AutoBuilder::new(TokioExecutor::new());
    builder
        .http1()
        .timer(TokioTimer::new())
        .max_buf_size(settings.max_header_bytes.max(MIN_READ_BUF_SIZE));
    if !settings.read_timeout.is_zero() {
        builder.http1().header_read_timeout(settings.read_timeout);
    }
    builder
        .http2()
        .timer(TokioTimer::new())
        .max_header_list_size(u32::try_from(settings.max_header_bytes).unwrap_or(u32::MAX));

    let conn = builder.serve_connection(TokioIo::new(stream), service);
    tokio::pin!(conn);

    let idle = async {
        if settings.idle_timeout.is_zero() {
            future::pending::<()>().await
        } else {
            activity.idle_for(settings.idle_timeout).await
        }
    };
    tokio::pin!(idle);

    let mut closing = false;
    loop {
        tokio::select! {
            result = conn.as_mut() => {
                if let Err(e) = result {
                    error_log.write(&format!("http: error serving connection from {}: {}", peer, e));
                }
                break;
            }
            _ = stop.cancelled(), if !closing => {
                closing = true;
                conn.as_mut().graceful_shutdown();
            }
            _ = &mut idle, if !closing => {
                tracing::trace!(connection_id = %id, "closing idle connection");
                closing = true;
                conn.as_mut().graceful_shutdown();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::InMemoryMetrics;
    use axum::{http::Request, routing::get};

    async fn explode() -> &'static str {
        panic!("kaboom")
    }

    fn tagging(tag: &'static str) -> impl Fn(Router) -> Router + Send + Sync + 'static {
        move |router: Router| {
            router.layer(axum::middleware::from_fn(
                move |req: axum::extract::Request, next: axum::middleware::Next| async move {
                    let mut response = next.run(req).await;
                    response
                        .headers_mut()
                        .append("x-order", tag.parse().unwrap());
                    response
                },
            ))
        }
    }

    #[tokio::test]
    async fn first_registered_middleware_is_outermost() {
        let listener = HttpListener::new(
            ListenerOptions::new()
                .with_middleware(tagging("first"))
                .with_middleware(tagging("second")),
        );
        let app = listener.compose(Router::new().route("/", get(|| async { "ok" })));

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        // inner layers append first
        let order: Vec<_> = response
            .headers()
            .get_all("x-order")
            .iter()
            .map(|v| v.to_str().unwrap().to_owned())
            .collect();
        assert_eq!(order, ["second", "first"]);
    }

    #[tokio::test]
    async fn composed_service_turns_panics_into_500() {
        let metrics = Arc::new(InMemoryMetrics::new());
        let (logger, _logs) = Logger::capturing();
        let listener = HttpListener::new(
            ListenerOptions::new()
                .with_logger(logger)
                .with_metrics(metrics.clone()),
        );
        let app = listener.compose(Router::new().route("/boom", get(explode)));

        let response = app
            .oneshot(Request::builder().uri("/boom").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            metrics.count(crate::observability::metrics::METRIC_PANIC_COUNTER),
            1
        );
    }

    #[test]
    fn errors_render() {
        assert_eq!(
            ListenError::ShutdownTimeout(Duration::from_secs(2)).to_string(),
            "graceful shutdown did not finish within 2s"
        );
        assert_eq!(ListenError::Cancelled.to_string(), "listen context cancelled");
    }
}
