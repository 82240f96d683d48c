//! Configuration module for loading and parsing TOML configuration files.

use crate::ratelimit::{RateLimitRule, RuleError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use thiserror::Error;
use utoipa::ToSchema;

/// Configuration error types.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    /// Failed to parse TOML configuration.
    #[error("failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    /// Invalid configuration value.
    #[error("invalid config value: {0}")]
    InvalidValue(String),
}

impl From<RuleError> for ConfigError {
    fn from(err: RuleError) -> Self {
        ConfigError::InvalidValue(err.to_string())
    }
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,
    /// Admission control configuration.
    pub rate_limit: RateLimitConfig,
    /// Asynchronous task processing configuration.
    pub tasks: TaskConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address to bind to.
    pub host: String,
    /// Port number to listen on.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// A rate limit rule as written in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RuleConfig {
    /// Requests allowed per window.
    pub max_requests: u32,
    /// Window length in seconds.
    pub window_seconds: u64,
    /// Burst allowance; defaults to `max_requests`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub burst: Option<u32>,
}

impl RuleConfig {
    /// Converts the configured values into a validated rule.
    ///
    /// # Errors
    /// Returns error if the values violate the rule invariants.
    pub fn to_rule(&self) -> Result<RateLimitRule, RuleError> {
        RateLimitRule::new(
            self.max_requests,
            self.window_seconds,
            self.burst.unwrap_or(self.max_requests),
        )
    }
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window_seconds: 60,
            burst: None,
        }
    }
}

/// A route pattern bound to a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RouteRuleConfig {
    /// Path pattern, matched exactly first and then as a prefix.
    pub pattern: String,
    /// Requests allowed per window.
    pub max_requests: u32,
    /// Window length in seconds.
    pub window_seconds: u64,
    /// Burst allowance; defaults to `max_requests`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub burst: Option<u32>,
}

impl RouteRuleConfig {
    /// Returns the rule portion of this entry.
    #[must_use]
    pub fn rule(&self) -> RuleConfig {
        RuleConfig {
            max_requests: self.max_requests,
            window_seconds: self.window_seconds,
            burst: self.burst,
        }
    }
}

/// Admission control configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Whether rate limiting is applied at all.
    pub enabled: bool,
    /// Path prefixes that bypass admission control entirely.
    pub excluded_paths: Vec<String>,
    /// Minimum seconds between two eviction sweeps.
    pub sweep_interval_secs: u64,
    /// Idle seconds after which a bucket is evicted.
    pub bucket_retention_secs: u64,
    /// Rule applied when no route pattern matches.
    pub default: RuleConfig,
    /// Per-route rules.
    pub routes: Vec<RouteRuleConfig>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            excluded_paths: vec![
                "/health".to_string(),
                "/swagger-ui".to_string(),
                "/api-docs".to_string(),
            ],
            sweep_interval_secs: 300,
            bucket_retention_secs: 3600,
            default: RuleConfig::default(),
            routes: vec![RouteRuleConfig {
                pattern: "/api/v1/signals/parse".to_string(),
                max_requests: 10,
                window_seconds: 60,
                burst: Some(15),
            }],
        }
    }
}

/// Asynchronous task processing configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    /// Maximum number of tasks waiting in the queue.
    pub queue_capacity: usize,
    /// How long the worker waits for a task before re-checking for shutdown.
    pub poll_interval_ms: u64,
    /// Age in hours after which task results are purged.
    pub max_age_hours: u64,
    /// Seconds between two result cleanup passes.
    pub cleanup_interval_secs: u64,
    /// Seconds shutdown waits for the task in flight before abandoning it.
    pub shutdown_timeout_secs: u64,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            poll_interval_ms: 1000,
            max_age_hours: 24,
            cleanup_interval_secs: 3600,
            shutdown_timeout_secs: 30,
        }
    }
}

impl Config {
    /// Loads configuration from a TOML file.
    ///
    /// # Arguments
    /// * `path` - Path to the configuration file.
    ///
    /// # Errors
    /// Returns error if file cannot be read, parsed or validated.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parses configuration from a TOML string.
    ///
    /// # Arguments
    /// * `content` - TOML content as string.
    ///
    /// # Errors
    /// Returns error if content cannot be parsed or validated.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    fn validate(&self) -> Result<(), ConfigError> {
        self.rate_limit.default.to_rule()?;
        validate_routes(&self.rate_limit.routes)?;

        for path in &self.rate_limit.excluded_paths {
            if !path.starts_with('/') {
                return Err(ConfigError::InvalidValue(format!(
                    "excluded path {} must start with '/'",
                    path
                )));
            }
        }

        if self.rate_limit.sweep_interval_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "rate_limit.sweep_interval_secs must be positive".to_string(),
            ));
        }
        if self.rate_limit.bucket_retention_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "rate_limit.bucket_retention_secs must be positive".to_string(),
            ));
        }
        if self.tasks.queue_capacity == 0 {
            return Err(ConfigError::InvalidValue(
                "tasks.queue_capacity must be positive".to_string(),
            ));
        }
        if self.tasks.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "tasks.poll_interval_ms must be positive".to_string(),
            ));
        }
        if self.tasks.cleanup_interval_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "tasks.cleanup_interval_secs must be positive".to_string(),
            ));
        }
        if self.tasks.shutdown_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "tasks.shutdown_timeout_secs must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

/// Validates a route table: patterns must be absolute, unique, and carry valid rules.
///
/// # Errors
/// Returns the first problem found.
pub fn validate_routes(routes: &[RouteRuleConfig]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for route in routes {
        if !route.pattern.starts_with('/') {
            return Err(ConfigError::InvalidValue(format!(
                "route pattern {:?} must start with '/'",
                route.pattern
            )));
        }
        if !seen.insert(route.pattern.as_str()) {
            return Err(ConfigError::InvalidValue(format!(
                "duplicate route pattern {}",
                route.pattern
            )));
        }
        route.rule().to_rule().map_err(|e| {
            ConfigError::InvalidValue(format!("route {}: {}", route.pattern, e))
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[server]
host = "127.0.0.1"
port = 3000

[rate_limit]
enabled = true
excluded_paths = ["/health"]
sweep_interval_secs = 120

[rate_limit.default]
max_requests = 50
window_seconds = 60

[[rate_limit.routes]]
pattern = "/api/v1/signals/parse"
max_requests = 5
window_seconds = 60
burst = 8

[[rate_limit.routes]]
pattern = "/api/v1/trades"
max_requests = 30
window_seconds = 10

[tasks]
queue_capacity = 64
poll_interval_ms = 250
max_age_hours = 12
"#;

        let config = Config::parse(toml_content).expect("should parse");
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert!(config.rate_limit.enabled);
        assert_eq!(config.rate_limit.excluded_paths, vec!["/health"]);
        assert_eq!(config.rate_limit.sweep_interval_secs, 120);
        assert_eq!(config.rate_limit.bucket_retention_secs, 3600);
        assert_eq!(config.rate_limit.default.max_requests, 50);
        assert_eq!(config.rate_limit.routes.len(), 2);
        assert_eq!(config.rate_limit.routes[0].burst, Some(8));
        assert_eq!(config.rate_limit.routes[1].burst, None);
        assert_eq!(config.tasks.queue_capacity, 64);
        assert_eq!(config.tasks.poll_interval_ms, 250);
        assert_eq!(config.tasks.max_age_hours, 12);
        assert_eq!(config.tasks.cleanup_interval_secs, 3600);
        assert_eq!(config.tasks.shutdown_timeout_secs, 30);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::parse("").expect("should parse");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.rate_limit.sweep_interval_secs, 300);
        assert_eq!(config.tasks.max_age_hours, 24);
        assert!(
            config
                .rate_limit
                .excluded_paths
                .contains(&"/health".to_string())
        );
    }

    #[test]
    fn test_burst_defaults_to_max_requests() {
        let rule = RuleConfig {
            max_requests: 7,
            window_seconds: 30,
            burst: None,
        }
        .to_rule()
        .expect("valid rule");
        assert_eq!(rule.burst(), 7);
    }

    #[test]
    fn test_validation_rejects_burst_below_limit() {
        let toml_content = r#"
[[rate_limit.routes]]
pattern = "/api/v1/orders"
max_requests = 10
window_seconds = 60
burst = 5
"#;
        assert!(matches!(
            Config::parse(toml_content),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_validation_rejects_zero_window() {
        let toml_content = r#"
[rate_limit.default]
max_requests = 10
window_seconds = 0
"#;
        assert!(Config::parse(toml_content).is_err());
    }

    #[test]
    fn test_validation_rejects_unrepresentable_window() {
        let toml_content = format!(
            r#"
[[rate_limit.routes]]
pattern = "/api/v1/orders"
max_requests = 10
window_seconds = {}
"#,
            i64::MAX
        );
        let err = Config::parse(&toml_content).unwrap_err();
        assert!(err.to_string().contains("window_seconds"), "{}", err);
    }

    #[test]
    fn test_validation_rejects_duplicate_patterns() {
        let routes = vec![
            RouteRuleConfig {
                pattern: "/a".to_string(),
                max_requests: 1,
                window_seconds: 1,
                burst: None,
            },
            RouteRuleConfig {
                pattern: "/a".to_string(),
                max_requests: 2,
                window_seconds: 1,
                burst: None,
            },
        ];
        assert!(validate_routes(&routes).is_err());
    }

    #[test]
    fn test_validation_rejects_relative_pattern() {
        let routes = vec![RouteRuleConfig {
            pattern: "api/v1".to_string(),
            max_requests: 1,
            window_seconds: 1,
            burst: None,
        }];
        assert!(validate_routes(&routes).is_err());
    }

    #[test]
    fn test_validation_rejects_zero_queue_capacity() {
        let mut config = Config::default();
        config.tasks.queue_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_zero_shutdown_timeout() {
        let mut config = Config::default();
        config.tasks.shutdown_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_example_config_is_valid() {
        let config = Config::parse(include_str!("../config.example.toml")).unwrap();
        assert_eq!(config.rate_limit.routes.len(), 2);
        assert_eq!(config.rate_limit.routes[0].burst, Some(15));
        assert_eq!(config.tasks.queue_capacity, 1024);
        assert_eq!(config.tasks.shutdown_timeout_secs, 30);
    }
}
