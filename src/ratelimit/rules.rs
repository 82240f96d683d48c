//! Rate limit rules and route-pattern matching.

use crate::config::{ConfigError, RateLimitConfig, RouteRuleConfig, validate_routes};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use utoipa::ToSchema;

/// Longest accepted window: one year.
pub const MAX_WINDOW_SECONDS: u64 = 365 * 24 * 60 * 60;

/// Reasons a rule can be rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleError {
    /// `max_requests` was zero.
    #[error("max_requests must be positive")]
    ZeroLimit,
    /// `window_seconds` was zero.
    #[error("window_seconds must be positive")]
    ZeroWindow,
    /// `window_seconds` exceeded [`MAX_WINDOW_SECONDS`].
    #[error("window_seconds ({0}) must be at most {MAX_WINDOW_SECONDS}")]
    WindowTooLarge(u64),
    /// `burst` was below `max_requests`.
    #[error("burst ({burst}) must be at least max_requests ({max_requests})")]
    BurstBelowLimit {
        /// Configured burst.
        burst: u32,
        /// Configured limit.
        max_requests: u32,
    },
}

/// An immutable fixed-window rate limit rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct RateLimitRule {
    max_requests: u32,
    window_seconds: u64,
    burst: u32,
}

impl RateLimitRule {
    /// Creates a rule, enforcing `max_requests > 0`,
    /// `0 < window_seconds <= MAX_WINDOW_SECONDS` and `burst >= max_requests`.
    ///
    /// # Errors
    /// Returns the violated invariant.
    pub fn new(max_requests: u32, window_seconds: u64, burst: u32) -> Result<Self, RuleError> {
        if max_requests == 0 {
            return Err(RuleError::ZeroLimit);
        }
        if window_seconds == 0 {
            return Err(RuleError::ZeroWindow);
        }
        if window_seconds > MAX_WINDOW_SECONDS {
            return Err(RuleError::WindowTooLarge(window_seconds));
        }
        if burst < max_requests {
            return Err(RuleError::BurstBelowLimit {
                burst,
                max_requests,
            });
        }
        Ok(Self {
            max_requests,
            window_seconds,
            burst,
        })
    }

    /// Requests allowed per window.
    #[must_use]
    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    /// Window length in seconds.
    #[must_use]
    pub fn window_seconds(&self) -> u64 {
        self.window_seconds
    }

    /// Burst allowance.
    #[must_use]
    pub fn burst(&self) -> u32 {
        self.burst
    }
}

/// How a route was matched against the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    /// The path equals a registered pattern.
    Exact,
    /// The path starts with a registered pattern.
    Prefix,
    /// Nothing matched; the default rule applies.
    Default,
}

/// Result of a rule lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleMatch {
    /// Key that scopes the bucket: the matched pattern, or the raw path for
    /// the default rule.
    pub route_key: String,
    /// The applicable rule.
    pub rule: RateLimitRule,
    /// How the rule was found.
    pub kind: MatchKind,
}

#[derive(Debug)]
struct RuleTable {
    default: RateLimitRule,
    exact: HashMap<String, RateLimitRule>,
    /// Sorted longest pattern first.
    prefixes: Vec<(String, RateLimitRule)>,
}

impl RuleTable {
    fn build(default: RateLimitRule, routes: Vec<(String, RateLimitRule)>) -> Self {
        let exact = routes.iter().cloned().collect();
        let mut prefixes = routes;
        prefixes.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));
        Self {
            default,
            exact,
            prefixes,
        }
    }

    fn resolve(&self, path: &str) -> RuleMatch {
        if let Some((pattern, rule)) = self.exact.get_key_value(path) {
            return RuleMatch {
                route_key: pattern.clone(),
                rule: *rule,
                kind: MatchKind::Exact,
            };
        }

        if let Some((pattern, rule)) = self.prefixes.iter().find(|(p, _)| path.starts_with(p)) {
            return RuleMatch {
                route_key: pattern.clone(),
                rule: *rule,
                kind: MatchKind::Prefix,
            };
        }

        RuleMatch {
            route_key: path.to_string(),
            rule: self.default,
            kind: MatchKind::Default,
        }
    }
}

/// Maps route patterns to rules.
///
/// Lookups read an immutable snapshot; [`RuleRegistry::replace`] swaps the
/// whole table at once so a lookup never observes a half-updated table.
#[derive(Debug)]
pub struct RuleRegistry {
    table: RwLock<Arc<RuleTable>>,
}

impl RuleRegistry {
    /// Creates a registry from already-validated rules.
    #[must_use]
    pub fn new(default: RateLimitRule, routes: Vec<(String, RateLimitRule)>) -> Self {
        Self {
            table: RwLock::new(Arc::new(RuleTable::build(default, routes))),
        }
    }

    /// Builds the registry from configuration.
    ///
    /// # Errors
    /// Returns error if any configured rule or pattern is invalid.
    pub fn from_config(config: &RateLimitConfig) -> Result<Self, ConfigError> {
        let default = config.default.to_rule()?;
        let routes = compile_routes(&config.routes)?;
        Ok(Self::new(default, routes))
    }

    /// Finds the rule for a request path: exact match, then longest prefix,
    /// then the default rule.
    #[must_use]
    pub fn resolve(&self, path: &str) -> RuleMatch {
        let table = self.table.read().clone();
        table.resolve(path)
    }

    /// Returns the default rule.
    #[must_use]
    pub fn default_rule(&self) -> RateLimitRule {
        self.table.read().default
    }

    /// Returns the registered routes ordered by pattern.
    #[must_use]
    pub fn routes(&self) -> Vec<(String, RateLimitRule)> {
        let table = self.table.read().clone();
        let mut routes = table.prefixes.clone();
        routes.sort_by(|a, b| a.0.cmp(&b.0));
        routes
    }

    /// Atomically replaces the route table, and the default rule when given.
    ///
    /// # Errors
    /// Returns error, leaving the current table untouched, if any entry is invalid.
    pub fn replace(
        &self,
        default: Option<RateLimitRule>,
        routes: &[RouteRuleConfig],
    ) -> Result<(), ConfigError> {
        let compiled = compile_routes(routes)?;
        let mut table = self.table.write();
        let default = default.unwrap_or(table.default);
        *table = Arc::new(RuleTable::build(default, compiled));
        Ok(())
    }
}

fn compile_routes(
    routes: &[RouteRuleConfig],
) -> Result<Vec<(String, RateLimitRule)>, ConfigError> {
    validate_routes(routes)?;
    routes
        .iter()
        .map(|r| -> Result<(String, RateLimitRule), ConfigError> {
            Ok((r.pattern.clone(), r.rule().to_rule()?))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(max: u32, window: u64) -> RateLimitRule {
        RateLimitRule::new(max, window, max).unwrap()
    }

    fn registry() -> RuleRegistry {
        RuleRegistry::new(
            rule(100, 60),
            vec![
                ("/api/v1".to_string(), rule(50, 60)),
                ("/api/v1/signals".to_string(), rule(20, 60)),
                ("/api/v1/signals/parse".to_string(), rule(5, 60)),
            ],
        )
    }

    #[test]
    fn test_rule_invariants() {
        assert_eq!(RateLimitRule::new(0, 60, 0), Err(RuleError::ZeroLimit));
        assert_eq!(RateLimitRule::new(5, 0, 5), Err(RuleError::ZeroWindow));
        assert_eq!(
            RateLimitRule::new(5, 60, 4),
            Err(RuleError::BurstBelowLimit {
                burst: 4,
                max_requests: 5
            })
        );
        let r = RateLimitRule::new(5, 60, 10).unwrap();
        assert_eq!(r.max_requests(), 5);
        assert_eq!(r.window_seconds(), 60);
        assert_eq!(r.burst(), 10);
    }

    #[test]
    fn test_window_upper_bound() {
        assert!(RateLimitRule::new(5, MAX_WINDOW_SECONDS, 5).is_ok());
        assert_eq!(
            RateLimitRule::new(5, MAX_WINDOW_SECONDS + 1, 5),
            Err(RuleError::WindowTooLarge(MAX_WINDOW_SECONDS + 1))
        );
        assert_eq!(
            RateLimitRule::new(5, u64::MAX, 5),
            Err(RuleError::WindowTooLarge(u64::MAX))
        );
    }

    #[test]
    fn test_exact_match_wins() {
        let m = registry().resolve("/api/v1/signals/parse");
        assert_eq!(m.kind, MatchKind::Exact);
        assert_eq!(m.route_key, "/api/v1/signals/parse");
        assert_eq!(m.rule.max_requests(), 5);
    }

    #[test]
    fn test_longest_prefix_wins() {
        let m = registry().resolve("/api/v1/signals/tasks/abc");
        assert_eq!(m.kind, MatchKind::Prefix);
        assert_eq!(m.route_key, "/api/v1/signals");
        assert_eq!(m.rule.max_requests(), 20);

        let m = registry().resolve("/api/v1/trades");
        assert_eq!(m.route_key, "/api/v1");
        assert_eq!(m.rule.max_requests(), 50);
    }

    #[test]
    fn test_default_rule_uses_raw_path() {
        let m = registry().resolve("/metrics");
        assert_eq!(m.kind, MatchKind::Default);
        assert_eq!(m.route_key, "/metrics");
        assert_eq!(m.rule.max_requests(), 100);
    }

    #[test]
    fn test_replace_swaps_whole_table() {
        let registry = registry();
        registry
            .replace(
                Some(rule(10, 10)),
                &[RouteRuleConfig {
                    pattern: "/api/v2".to_string(),
                    max_requests: 3,
                    window_seconds: 30,
                    burst: None,
                }],
            )
            .unwrap();

        assert_eq!(registry.default_rule().max_requests(), 10);
        assert_eq!(registry.resolve("/api/v1/signals/parse").kind, MatchKind::Default);
        assert_eq!(registry.resolve("/api/v2/orders").rule.max_requests(), 3);
        assert_eq!(registry.routes().len(), 1);
    }

    #[test]
    fn test_replace_rejects_invalid_and_keeps_table() {
        let registry = registry();
        let result = registry.replace(
            None,
            &[RouteRuleConfig {
                pattern: "/x".to_string(),
                max_requests: 0,
                window_seconds: 30,
                burst: None,
            }],
        );
        assert!(result.is_err());
        assert_eq!(registry.routes().len(), 3);
        assert_eq!(registry.default_rule().max_requests(), 100);
    }
}
