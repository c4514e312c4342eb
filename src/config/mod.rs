//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → env.rs (SERVICE_PORT / READINESS_PORT overlay)
//!     → ServiceConfig (validated, immutable)
//!     → ListenerOptions::from_config / SamplerOptions::from_env
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; a listener never sees it change
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod env;
pub mod loader;
pub mod schema;
pub mod validation;

pub use env::{EnvConfig, EnvDuration};
pub use loader::{load_config, resolve_config, ConfigError};
pub use schema::{ListenerConfig, ObservabilityConfig, ReadinessConfig, RuntimeMetricsConfig, ServiceConfig};
