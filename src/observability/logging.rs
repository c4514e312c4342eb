//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the process-wide tracing subscriber
//! - Carry an explicit logger handle into the lifecycle core
//! - Capture log records in memory for inspection
//!
//! # Design Decisions
//! - Uses the tracing crate for structured logging
//! - Core components log through a [`Logger`] they were given, never the
//!   ambient subscriber, so an unconfigured component stays silent

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};

use tracing::field::{Field, Visit};
use tracing::instrument::{WithDispatch, WithSubscriber};
use tracing::{Dispatch, Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

/// Install the global subscriber: env filter (falling back to `default_filter`)
/// plus the fmt layer.
pub fn init_tracing(default_filter: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    if let Err(e) = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
    {
        eprintln!("tracing subscriber already installed: {e}");
    }
}

/// Handle to a tracing dispatcher.
///
/// Events emitted inside [`Logger::in_scope`] go to this logger's dispatcher
/// regardless of the thread-local or global default.
#[derive(Debug, Clone)]
pub struct Logger {
    dispatch: Dispatch,
}

impl Logger {
    /// Logger that discards every record.
    pub fn nop() -> Self {
        Self {
            dispatch: Dispatch::none(),
        }
    }

    pub fn new(dispatch: Dispatch) -> Self {
        Self { dispatch }
    }

    /// Logger bound to whatever dispatcher is the default right now.
    pub fn current() -> Self {
        Self {
            dispatch: tracing::dispatcher::get_default(Dispatch::clone),
        }
    }

    /// Logger that keeps every record in memory.
    pub fn capturing() -> (Self, CapturedLogs) {
        let logs = CapturedLogs::default();
        let layer = CaptureLayer { logs: logs.clone() };
        let dispatch = Dispatch::new(tracing_subscriber::registry().with(layer));
        (Self { dispatch }, logs)
    }

    /// Run `f` with this logger as the default dispatcher.
    pub fn in_scope<T>(&self, f: impl FnOnce() -> T) -> T {
        tracing::dispatcher::with_default(&self.dispatch, f)
    }

    /// Bind this logger to `fut` for every poll, wherever it runs.
    pub fn attach<F: Future>(&self, fut: F) -> WithDispatch<F> {
        fut.with_subscriber(self.dispatch.clone())
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::nop()
    }
}

/// A single captured event.
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub level: Level,
    pub message: String,
    pub fields: BTreeMap<String, String>,
}

impl LogRecord {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

/// Shared buffer filled by a capturing [`Logger`].
#[derive(Debug, Clone, Default)]
pub struct CapturedLogs {
    records: Arc<Mutex<Vec<LogRecord>>>,
}

impl CapturedLogs {
    pub fn records(&self) -> Vec<LogRecord> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Records emitted at exactly `level`.
    pub fn at_level(&self, level: Level) -> Vec<LogRecord> {
        self.records()
            .into_iter()
            .filter(|r| r.level == level)
            .collect()
    }
}

struct CaptureLayer {
    logs: CapturedLogs,
}

impl<S: Subscriber> Layer<S> for CaptureLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let record = LogRecord {
            level: *event.metadata().level(),
            message: visitor.message,
            fields: visitor.fields,
        };
        self.logs
            .records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(record);
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: String,
    fields: BTreeMap<String, String>,
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_owned();
        } else {
            self.fields.insert(field.name().to_owned(), value.to_owned());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            self.fields
                .insert(field.name().to_owned(), format!("{value:?}"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capturing_logger_records_fields() {
        let (logger, logs) = Logger::capturing();
        logger.in_scope(|| {
            tracing::warn!(port = 8080, name = "svc", "something odd");
        });

        let records = logs.at_level(Level::WARN);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message, "something odd");
        assert_eq!(records[0].field("port"), Some("8080"));
        assert_eq!(records[0].field("name"), Some("svc"));
    }

    #[tokio::test]
    async fn attached_logger_follows_the_future() {
        let (logger, logs) = Logger::capturing();
        tokio::spawn(logger.attach(async {
            tokio::task::yield_now().await;
            tracing::info!("from a task");
        }))
        .await
        .unwrap();

        assert_eq!(logs.at_level(Level::INFO).len(), 1);
    }

    #[test]
    fn nop_logger_is_silent() {
        let (_, logs) = Logger::capturing();
        Logger::nop().in_scope(|| tracing::error!("dropped"));
        assert!(logs.records().is_empty());
    }
}
