//! Shutdown coordination for a listen cycle.

use std::fmt;
use std::future::Future;
use std::io;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::lifecycle::signals::TerminationSignal;
use crate::observability::metrics::METRIC_SHUTDOWN_PREFIX;

/// The event that ended a listen cycle.
#[derive(Debug)]
pub enum ShutdownTrigger {
    /// The server could not start or stopped on its own.
    ServerFault(io::Error),
    /// The process received a termination signal.
    Signal(TerminationSignal),
    /// The caller's context was cancelled.
    ContextCancelled,
}

impl ShutdownTrigger {
    /// Short name used in the shutdown metric key.
    pub fn metric_suffix(&self) -> &'static str {
        match self {
            ShutdownTrigger::ServerFault(_) => "fault",
            ShutdownTrigger::Signal(_) => "signal",
            ShutdownTrigger::ContextCancelled => "context",
        }
    }

    /// Full counter key, e.g. `service.api.shutdown.signal`.
    pub fn metric_key(&self) -> String {
        format!("{}.{}", METRIC_SHUTDOWN_PREFIX, self.metric_suffix())
    }
}

impl fmt::Display for ShutdownTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownTrigger::ServerFault(e) => write!(f, "server fault: {}", e),
            ShutdownTrigger::Signal(sig) => write!(f, "signal {}", sig),
            ShutdownTrigger::ContextCancelled => f.write_str("context cancelled"),
        }
    }
}

/// Coordinator for graceful shutdown.
///
/// Every long-running task of a listen cycle holds a subscription and stops
/// once the coordinator is triggered.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    token: CancellationToken,
}

impl Shutdown {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Trigger the shutdown signal.
    pub fn trigger(&self) {
        self.token.cancel();
    }
}

/// The drain did not finish within its deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainTimedOut(pub Duration);

/// Run `drain` to completion, bounded by `timeout`. Zero waits forever.
pub async fn drain_within<F>(timeout: Duration, drain: F) -> Result<(), DrainTimedOut>
where
    F: Future<Output = ()>,
{
    if timeout.is_zero() {
        drain.await;
        return Ok(());
    }

    tokio::time::timeout(timeout, drain)
        .await
        .map_err(|_| DrainTimedOut(timeout))
}
