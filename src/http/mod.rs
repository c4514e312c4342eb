//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection (net::Listener)
//!     → server.rs (hyper auto builder: HTTP/1.1 + HTTP/2, idle reaping)
//!     → CatchPanicLayer (panic → 500, notice to error_log.rs)
//!     → TimeoutLayer (write timeout)
//!     → user middleware (first registered outermost)
//!     → middleware/panic_guard.rs (log, count, re-raise)
//!     → service Router
//!     → response.rs (JSON error bodies)
//! ```
//!
//! # Design Decisions
//! - The handler is an opaque `axum::Router`; routing is the caller's concern
//! - One listen cycle per `HttpListener` at a time
//! - Options are fixed at construction

pub mod error_log;
pub mod middleware;
pub mod options;
pub mod response;
pub mod server;

pub use error_log::ErrorLog;
pub use middleware::PanicGuard;
pub use options::{ListenerOptions, Middleware};
pub use response::format_error;
pub use server::{serve_from_env, HttpListener, ListenError};
