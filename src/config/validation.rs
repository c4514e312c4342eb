//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (limits > 0, header buffer large enough)
//! - Detect port collisions between servers
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServiceConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::ServiceConfig;

/// Smallest header limit the HTTP/1 connection buffer accepts.
pub const MIN_HEADER_BYTES: usize = 8 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listener.max_connections must be greater than zero")]
    ZeroMaxConnections,

    #[error("listener.max_header_bytes must be at least {min}, got {got}")]
    HeaderLimitTooSmall { min: usize, got: usize },

    #[error("runtime_metrics.interval_secs must be greater than zero")]
    ZeroSampleInterval,

    #[error("readiness.port {0} collides with listener.port")]
    PortCollision(u16),

    #[error("observability.metrics_address {0:?} is not a socket address")]
    InvalidMetricsAddress(String),
}

pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.max_connections == 0 {
        errors.push(ValidationError::ZeroMaxConnections);
    }

    if config.listener.max_header_bytes < MIN_HEADER_BYTES {
        errors.push(ValidationError::HeaderLimitTooSmall {
            min: MIN_HEADER_BYTES,
            got: config.listener.max_header_bytes,
        });
    }

    if config.runtime_metrics.enabled && config.runtime_metrics.interval_secs == 0 {
        errors.push(ValidationError::ZeroSampleInterval);
    }

    if config.readiness.enabled
        && config.readiness.port != 0
        && config.readiness.port == config.listener.port
    {
        errors.push(ValidationError::PortCollision(config.readiness.port));
    }

    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(validate_config(&ServiceConfig::default()), Ok(()));
    }

    #[test]
    fn reports_every_violation() {
        let mut config = ServiceConfig::default();
        config.listener.max_connections = 0;
        config.listener.max_header_bytes = 512;
        config.readiness.port = config.listener.port;
        config.observability.metrics_address = "nowhere".into();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::ZeroMaxConnections,
                ValidationError::HeaderLimitTooSmall { min: MIN_HEADER_BYTES, got: 512 },
                ValidationError::PortCollision(8080),
                ValidationError::InvalidMetricsAddress("nowhere".into()),
            ]
        );
    }

    #[test]
    fn disabled_sections_are_not_checked() {
        let mut config = ServiceConfig::default();
        config.runtime_metrics.enabled = false;
        config.runtime_metrics.interval_secs = 0;
        config.readiness.enabled = false;
        config.readiness.port = config.listener.port;
        config.observability.metrics_enabled = false;
        config.observability.metrics_address.clear();

        assert!(validate_config(&config).is_ok());
    }
}
