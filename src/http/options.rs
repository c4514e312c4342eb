//! Listener options.
//!
//! Built once from defaults with `with_*` calls; later calls override earlier
//! ones and `with_middleware` appends. Immutable once handed to
//! [`HttpListener::new`](crate::http::HttpListener::new).

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;

use crate::config::ListenerConfig;
use crate::observability::{Logger, Metrics, NopMetrics};

/// A transformation applied to the service router, e.g. adding a layer.
pub type Middleware = Arc<dyn Fn(Router) -> Router + Send + Sync>;

pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_HEADER_BYTES: usize = 1 << 20;
pub const DEFAULT_MAX_CONNECTIONS: usize = 10_000;

/// Configuration of an [`HttpListener`](crate::http::HttpListener).
///
/// A zero read, write or idle timeout disables that timeout. A zero shutdown
/// timeout lets the drain wait forever.
#[derive(Clone)]
pub struct ListenerOptions {
    read_timeout: Duration,
    write_timeout: Duration,
    idle_timeout: Duration,
    shutdown_timeout: Duration,
    max_header_bytes: usize,
    max_connections: usize,
    middlewares: Vec<Middleware>,
    logger: Option<Logger>,
    metrics: Arc<dyn Metrics>,
}

impl Default for ListenerOptions {
    fn default() -> Self {
        Self {
            read_timeout: DEFAULT_READ_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            max_header_bytes: DEFAULT_MAX_HEADER_BYTES,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            middlewares: Vec::new(),
            logger: None,
            metrics: Arc::new(NopMetrics),
        }
    }
}

impl ListenerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Options taken from the `[listener]` config section; logger, metrics
    /// and middleware keep their defaults.
    pub fn from_config(config: &ListenerConfig) -> Self {
        Self::default()
            .with_read_timeout(Duration::from_secs(config.read_timeout_secs))
            .with_write_timeout(Duration::from_secs(config.write_timeout_secs))
            .with_idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .with_shutdown_timeout(Duration::from_secs(config.shutdown_timeout_secs))
            .with_max_header_bytes(config.max_header_bytes)
            .with_max_connections(config.max_connections)
    }

    /// Time allowed to read a request's headers.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Time allowed for the service to produce a response.
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Time a keep-alive connection may sit without a request.
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Bound on the graceful drain.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn with_max_header_bytes(mut self, bytes: usize) -> Self {
        self.max_header_bytes = bytes;
        self
    }

    pub fn with_max_connections(mut self, connections: usize) -> Self {
        self.max_connections = connections;
        self
    }

    /// Append a middleware. The first registered ends up outermost.
    pub fn with_middleware<F>(mut self, middleware: F) -> Self
    where
        F: Fn(Router) -> Router + Send + Sync + 'static,
    {
        self.middlewares.push(Arc::new(middleware));
        self
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    pub fn write_timeout(&self) -> Duration {
        self.write_timeout
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    pub fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }

    pub fn max_header_bytes(&self) -> usize {
        self.max_header_bytes
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Middleware in registration order.
    pub fn middlewares(&self) -> &[Middleware] {
        &self.middlewares
    }

    /// The configured logger, or a silent one.
    pub fn logger(&self) -> Logger {
        self.logger.clone().unwrap_or_default()
    }

    /// The logger, only if one was configured.
    pub fn configured_logger(&self) -> Option<&Logger> {
        self.logger.as_ref()
    }

    pub fn metrics(&self) -> Arc<dyn Metrics> {
        Arc::clone(&self.metrics)
    }
}

impl fmt::Debug for ListenerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerOptions")
            .field("read_timeout", &self.read_timeout)
            .field("write_timeout", &self.write_timeout)
            .field("idle_timeout", &self.idle_timeout)
            .field("shutdown_timeout", &self.shutdown_timeout)
            .field("max_header_bytes", &self.max_header_bytes)
            .field("max_connections", &self.max_connections)
            .field("middlewares", &self.middlewares.len())
            .field("logger", &self.logger.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let options = ListenerOptions::default();
        assert_eq!(options.read_timeout(), Duration::from_secs(30));
        assert_eq!(options.write_timeout(), Duration::from_secs(60));
        assert_eq!(options.idle_timeout(), Duration::from_secs(120));
        assert_eq!(options.shutdown_timeout(), Duration::from_secs(30));
        assert_eq!(options.max_header_bytes(), 1 << 20);
        assert_eq!(options.max_connections(), 10_000);
        assert!(options.middlewares().is_empty());
        assert!(options.configured_logger().is_none());
    }

    #[test]
    fn later_options_override_earlier_ones() {
        let options = ListenerOptions::new()
            .with_shutdown_timeout(Duration::from_secs(5))
            .with_read_timeout(Duration::ZERO)
            .with_shutdown_timeout(Duration::from_secs(2));

        assert_eq!(options.shutdown_timeout(), Duration::from_secs(2));
        assert_eq!(options.read_timeout(), Duration::ZERO);
        assert_eq!(options.write_timeout(), DEFAULT_WRITE_TIMEOUT);
    }

    #[test]
    fn middleware_appends_in_order() {
        let options = ListenerOptions::new()
            .with_middleware(|r| r)
            .with_middleware(|r| r);
        assert_eq!(options.middlewares().len(), 2);
    }

    #[test]
    fn from_config_copies_listener_section() {
        let config = ListenerConfig {
            read_timeout_secs: 1,
            write_timeout_secs: 0,
            idle_timeout_secs: 3,
            shutdown_timeout_secs: 4,
            max_header_bytes: 16 * 1024,
            max_connections: 12,
            ..ListenerConfig::default()
        };
        let options = ListenerOptions::from_config(&config);

        assert_eq!(options.read_timeout(), Duration::from_secs(1));
        assert_eq!(options.write_timeout(), Duration::ZERO);
        assert_eq!(options.idle_timeout(), Duration::from_secs(3));
        assert_eq!(options.shutdown_timeout(), Duration::from_secs(4));
        assert_eq!(options.max_header_bytes(), 16 * 1024);
        assert_eq!(options.max_connections(), 12);
    }
}
