//! Runtime shell for HTTP services.
//!
//! Runs an `axum::Router` behind a listener that shuts down cleanly on the
//! first of a server fault, SIGINT/SIGTERM or cancellation of the caller's
//! context, contains handler panics, and reports process runtime health.

pub mod config;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod resilience;

pub use config::ServiceConfig;
pub use http::{serve_from_env, HttpListener, ListenError, ListenerOptions};
pub use lifecycle::ShutdownTrigger;
pub use observability::{Logger, Metrics};
