//! OS signal handling.
//!
//! # Responsibilities
//! - Register interest in SIGINT and SIGTERM
//! - Translate the first delivery into a `TerminationSignal`
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - Interest is scoped to a `TerminationSignals` value; dropping it stops
//!   delivery to this listener
//! - Non-unix targets only observe Ctrl-C

use std::fmt;
use std::io;

/// A signal that asks the process to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationSignal {
    /// SIGINT (Ctrl-C).
    Interrupt,
    /// SIGTERM.
    Terminate,
}

impl fmt::Display for TerminationSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationSignal::Interrupt => f.write_str("SIGINT"),
            TerminationSignal::Terminate => f.write_str("SIGTERM"),
        }
    }
}

/// Registered interest in termination signals.
#[derive(Debug)]
pub struct TerminationSignals {
    #[cfg(unix)]
    interrupt: tokio::signal::unix::Signal,
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
}

impl TerminationSignals {
    /// Start listening for SIGINT and SIGTERM.
    ///
    /// Signals delivered before this call are not observed.
    #[cfg(unix)]
    pub fn register() -> io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    #[cfg(not(unix))]
    pub fn register() -> io::Result<Self> {
        Ok(Self {})
    }

    /// Wait for the next termination signal.
    #[cfg(unix)]
    pub async fn recv(&mut self) -> TerminationSignal {
        tokio::select! {
            Some(()) = self.interrupt.recv() => TerminationSignal::Interrupt,
            Some(()) = self.terminate.recv() => TerminationSignal::Terminate,
            else => std::future::pending().await,
        }
    }

    #[cfg(not(unix))]
    pub async fn recv(&mut self) -> TerminationSignal {
        match tokio::signal::ctrl_c().await {
            Ok(()) => TerminationSignal::Interrupt,
            Err(e) => {
                tracing::warn!(error = %e, "Ctrl-C handler unavailable");
                std::future::pending().await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_names() {
        assert_eq!(TerminationSignal::Interrupt.to_string(), "SIGINT");
        assert_eq!(TerminationSignal::Terminate.to_string(), "SIGTERM");
    }

    #[tokio::test]
    async fn registration_succeeds_inside_runtime() {
        let mut signals = TerminationSignals::register().unwrap();
        let pending = tokio::time::timeout(std::time::Duration::from_millis(20), signals.recv()).await;
        assert!(pending.is_err(), "no signal was raised");
    }
}
