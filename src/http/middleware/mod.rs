//! Middleware owned by the listener.

pub mod panic_guard;

pub use panic_guard::{panic_guard_middleware, panic_message, PanicGuard};
