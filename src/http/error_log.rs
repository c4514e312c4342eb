//! Sink for server-internal diagnostic lines.
//!
//! Connection errors, accept retries and the panic-to-500 notice arrive here
//! as plain text. With a logger configured, panic notices are dropped (the
//! panic guard already logged a structured record) and every other line is
//! logged at error level. Without one, lines go to stderr. Both sinks strip
//! the trailing line terminator.

use crate::observability::Logger;

/// Lines starting with this are duplicates of a panic-guard record.
pub const PANIC_LINE_PREFIX: &str = "http: panic serving";

#[derive(Debug, Clone, Default)]
pub struct ErrorLog {
    logger: Option<Logger>,
}

impl ErrorLog {
    pub fn new(logger: Option<Logger>) -> Self {
        Self { logger }
    }

    pub fn write(&self, line: &str) {
        match &self.logger {
            Some(logger) => {
                if line.starts_with(PANIC_LINE_PREFIX) {
                    return;
                }
                let line = strip_terminator(line);
                logger.in_scope(|| tracing::error!("{}", line));
            }
            None => eprintln!("{}", strip_terminator(line)),
        }
    }
}

fn strip_terminator(line: &str) -> &str {
    line.trim_end_matches(['\n', '\r'])
}
