//! Panic recovery middleware.
//!
//! # Responsibilities
//! - Observe a panic raised while the inner service produces a response
//! - Emit one error record (payload, stack, url, method) and one counter
//!   increment per panic
//! - Re-raise the panic with its original payload so the server-owned
//!   catch layer turns it into a 500
//!
//! The stack is captured by a process-wide panic hook at the panic site and
//! handed over through a thread local; the hook chains to whatever hook was
//! installed before it.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Once};

use axum::{
    extract::{Request, State},
    middleware::{self, Next},
    response::Response,
    Router,
};
use futures_util::FutureExt;

use crate::observability::metrics::METRIC_PANIC_COUNTER;
use crate::observability::{Logger, Metrics};

thread_local! {
    static PANIC_BACKTRACE: RefCell<Option<String>> = const { RefCell::new(None) };
}

static BACKTRACE_HOOK: Once = Once::new();

fn install_backtrace_hook() {
    BACKTRACE_HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let trace = Backtrace::force_capture().to_string();
            let _ = PANIC_BACKTRACE.try_with(|slot| *slot.borrow_mut() = Some(trace));
            previous(info);
        }));
    });
}

fn take_backtrace() -> Option<String> {
    PANIC_BACKTRACE
        .try_with(|slot| slot.borrow_mut().take())
        .ok()
        .flatten()
}

/// Text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Box<dyn Any>".to_owned()
    }
}

/// State of the panic recovery middleware.
#[derive(Clone)]
pub struct PanicGuard {
    logger: Logger,
    metrics: Arc<dyn Metrics>,
}

impl PanicGuard {
    pub fn new(logger: Logger, metrics: Arc<dyn Metrics>) -> Self {
        install_backtrace_hook();
        Self { logger, metrics }
    }

    /// Wrap every route of `router` in the guard.
    pub fn wrap(self, router: Router) -> Router {
        router.layer(middleware::from_fn_with_state(self, panic_guard_middleware))
    }
}

pub async fn panic_guard_middleware(
    State(guard): State<PanicGuard>,
    req: Request,
    next: Next,
) -> Response {
    let method = req.method().clone();
    let url = req.uri().clone();

    match AssertUnwindSafe(next.run(req)).catch_unwind().await {
        Ok(response) => response,
        Err(payload) => {
            let message = panic_message(&*payload);
            let stack = take_backtrace().unwrap_or_else(|| Backtrace::force_capture().to_string());

            guard.logger.in_scope(|| {
                tracing::error!(
                    panic = %message,
                    url = %url,
                    method = %method,
                    stack = %stack,
                    "panic while serving request"
                );
            });
            guard.metrics.increment(METRIC_PANIC_COUNTER);

            std::panic::resume_unwind(payload)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::{InMemoryMetrics, NopMetrics};
    use axum::{body::Body, http::StatusCode, routing::get};
    use tower::ServiceExt;
    use tracing::Level;

    fn app() -> Router {
        Router::new()
            .route("/ok", get(|| async { "fine" }))
            .route("/explode", get(explode))
    }

    async fn explode() -> &'static str {
        panic!("boom")
    }

    fn get_request(path: &str) -> Request {
        Request::builder().uri(path).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn panic_is_logged_counted_and_reraised() {
        let (logger, logs) = Logger::capturing();
        let metrics = Arc::new(InMemoryMetrics::new());
        let router = PanicGuard::new(logger, metrics.clone()).wrap(app());

        let outcome = AssertUnwindSafe(router.oneshot(get_request("/explode")))
            .catch_unwind()
            .await;

        let payload = outcome.expect_err("panic must propagate");
        assert_eq!(panic_message(&*payload), "boom");

        let records = logs.at_level(Level::ERROR);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].field("panic"), Some("boom"));
        assert_eq!(records[0].field("method"), Some("GET"));
        assert_eq!(records[0].field("url"), Some("/explode"));
        assert!(!records[0].field("stack").unwrap_or_default().is_empty());
        assert_eq!(metrics.count(METRIC_PANIC_COUNTER), 1);
    }

    #[tokio::test]
    async fn healthy_requests_pass_through_silently() {
        let (logger, logs) = Logger::capturing();
        let metrics = Arc::new(InMemoryMetrics::new());
        let router = PanicGuard::new(logger, metrics.clone()).wrap(app());

        let response = router.oneshot(get_request("/ok")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(logs.records().is_empty());
        assert!(metrics.is_empty());
    }

    #[tokio::test]
    async fn works_with_nop_collaborators() {
        let router = PanicGuard::new(Logger::nop(), Arc::new(NopMetrics)).wrap(app());

        let outcome = AssertUnwindSafe(router.oneshot(get_request("/explode")))
            .catch_unwind()
            .await;
        assert!(outcome.is_err());
    }

    #[test]
    fn payload_text() {
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        let other: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(&*owned), "owned");
        assert_eq!(panic_message(&*other), "Box<dyn Any>");
    }
}
