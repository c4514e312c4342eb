//! Process environment overrides.

use std::str::FromStr;
use std::time::Duration;

use envconfig::Envconfig;
use thiserror::Error;

use crate::config::schema::ServiceConfig;

/// Variables read from the process environment. All are optional.
#[derive(Envconfig, Debug, Clone, Default)]
pub struct EnvConfig {
    /// Port of the main listener.
    #[envconfig(from = "SERVICE_PORT")]
    pub service_port: Option<u16>,

    /// Port of the readiness endpoint server.
    #[envconfig(from = "READINESS_PORT")]
    pub readiness_port: Option<u16>,

    /// Process identity for runtime metric keys.
    #[envconfig(from = "POD_NAME")]
    pub pod_name: Option<String>,

    /// Runtime sampler interval override.
    #[envconfig(from = "RUNTIME_METRICS_COLLECTION_INTERVAL")]
    pub runtime_metrics_interval: Option<EnvDuration>,

    /// Commit reported by the readiness endpoint.
    #[envconfig(from = "GIT_COMMIT")]
    pub git_commit: Option<String>,
}

impl ServiceConfig {
    /// Overlay the ports found in the environment.
    pub fn apply_env(&mut self, env: &EnvConfig) {
        if let Some(port) = env.service_port {
            self.listener.port = port;
        }
        if let Some(port) = env.readiness_port {
            self.readiness.port = port;
        }
    }
}

/// Duration written as `<number><unit>` segments (`300ms`, `30s`, `1m30s`,
/// `2h`), or a bare number of seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvDuration(pub Duration);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid duration {0:?}")]
pub struct ParseEnvDurationError(String);

impl FromStr for EnvDuration {
    type Err = ParseEnvDurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseEnvDurationError(s.to_owned());
        let input = s.trim();
        if input.is_empty() {
            return Err(err());
        }

        if let Ok(secs) = input.parse::<u64>() {
            return Ok(EnvDuration(Duration::from_secs(secs)));
        }

        let mut total = Duration::ZERO;
        let mut rest = input;
        while !rest.is_empty() {
            let digits = rest.find(|c: char| !c.is_ascii_digit()).ok_or_else(err)?;
            if digits == 0 {
                return Err(err());
            }
            let value: u64 = rest[..digits].parse().map_err(|_| err())?;
            rest = &rest[digits..];

            let unit_len = rest.find(|c: char| c.is_ascii_digit()).unwrap_or(rest.len());
            let segment = match &rest[..unit_len] {
                "ms" => Duration::from_millis(value),
                "s" => Duration::from_secs(value),
                "m" => Duration::from_secs(value.saturating_mul(60)),
                "h" => Duration::from_secs(value.saturating_mul(3600)),
                _ => return Err(err()),
            };
            total = total.saturating_add(segment);
            rest = &rest[unit_len..];
        }

        Ok(EnvDuration(total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> Result<Duration, ParseEnvDurationError> {
        s.parse::<EnvDuration>().map(|d| d.0)
    }

    #[test]
    fn parses_units() {
        assert_eq!(parse("45"), Ok(Duration::from_secs(45)));
        assert_eq!(parse("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse("30s"), Ok(Duration::from_secs(30)));
        assert_eq!(parse("1m30s"), Ok(Duration::from_secs(90)));
        assert_eq!(parse("2h"), Ok(Duration::from_secs(7200)));
    }

    #[test]
    fn rejects_garbage() {
        for input in ["", "s", "10x", "1.5s", "-3s", "ms10"] {
            assert!(parse(input).is_err(), "{input:?} should not parse");
        }
    }

    #[test]
    fn env_ports_override_config() {
        let mut config = ServiceConfig::default();
        let env = EnvConfig {
            service_port: Some(9100),
            ..EnvConfig::default()
        };
        config.apply_env(&env);

        assert_eq!(config.listener.port, 9100);
        assert_eq!(config.readiness.port, 8081);
    }
}
