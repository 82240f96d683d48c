//! Admission controller: fixed-window rate limiting per identity and route.

use super::bucket::{BucketStore, bucket_key};
use super::rules::{RateLimitRule, RuleRegistry};
use crate::clock::{Clock, SystemClock};
use crate::config::{ConfigError, RateLimitConfig};
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Internal faults of the admission path. The HTTP layer treats all of them
/// as "allow the request".
#[derive(Debug, Error)]
pub enum AdmissionError {
    /// The rule's window cannot be represented as a time span.
    #[error("rate limit window of {0} seconds is out of range")]
    WindowOutOfRange(u64),
    /// The window end overflowed the supported time range.
    #[error("rate limit window end overflows for window starting at {0}")]
    ResetOverflow(DateTime<Utc>),
}

/// Rate limit metadata reported for every admitted or denied request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitInfo {
    /// Requests allowed per window.
    pub limit: u32,
    /// Requests left in the current window.
    pub remaining: u32,
    /// Epoch seconds at which the current window ends.
    pub reset_at: i64,
    /// Window length in seconds.
    pub window_seconds: u64,
    /// Seconds the client should wait, set only on denial.
    pub retry_after: Option<u64>,
}

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The request may proceed.
    Allowed(RateLimitInfo),
    /// The request exceeded its rule.
    Denied(RateLimitInfo),
}

impl Decision {
    /// Whether the request may proceed.
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed(_))
    }

    /// The metadata for either outcome.
    #[must_use]
    pub fn info(&self) -> &RateLimitInfo {
        match self {
            Decision::Allowed(info) | Decision::Denied(info) => info,
        }
    }
}

/// Decides whether requests are admitted.
///
/// Owns the bucket store exclusively. Stale buckets are swept from the hot
/// path at most once per sweep interval instead of from a separate timer.
pub struct AdmissionController {
    enabled: bool,
    rules: RuleRegistry,
    buckets: BucketStore,
    excluded_paths: Vec<String>,
    sweep_interval: Duration,
    retention: Duration,
    last_sweep: Mutex<DateTime<Utc>>,
    clock: Arc<dyn Clock>,
}

impl AdmissionController {
    /// Creates a controller using the system clock.
    ///
    /// # Errors
    /// Returns error if a configured rule is invalid.
    pub fn new(config: &RateLimitConfig) -> Result<Self, ConfigError> {
        Self::with_clock(config, Arc::new(SystemClock::new()))
    }

    /// Creates a controller reading time from `clock`.
    ///
    /// # Errors
    /// Returns error if a configured rule or interval is invalid.
    pub fn with_clock(config: &RateLimitConfig, clock: Arc<dyn Clock>) -> Result<Self, ConfigError> {
        let rules = RuleRegistry::from_config(config)?;
        let sweep_interval = seconds(config.sweep_interval_secs).ok_or_else(|| {
            ConfigError::InvalidValue("rate_limit.sweep_interval_secs out of range".to_string())
        })?;
        let retention = seconds(config.bucket_retention_secs).ok_or_else(|| {
            ConfigError::InvalidValue("rate_limit.bucket_retention_secs out of range".to_string())
        })?;
        let now = clock.now();

        Ok(Self {
            enabled: config.enabled,
            rules,
            buckets: BucketStore::new(),
            excluded_paths: config.excluded_paths.clone(),
            sweep_interval,
            retention,
            last_sweep: Mutex::new(now),
            clock,
        })
    }

    /// Whether requests to `path` skip admission control entirely.
    ///
    /// Excluded entries match the path itself and anything below it.
    #[must_use]
    pub fn bypasses(&self, path: &str) -> bool {
        if !self.enabled {
            return true;
        }
        self.excluded_paths.iter().any(|excluded| {
            path == excluded
                || path
                    .strip_prefix(excluded.as_str())
                    .is_some_and(|rest| rest.starts_with('/') || excluded.ends_with('/'))
        })
    }

    /// Records a request from `identity` to `path` and decides whether it is admitted.
    ///
    /// # Errors
    /// Returns error if the rule's window cannot be evaluated; callers should
    /// fail open.
    pub fn check(&self, identity: &str, path: &str) -> Result<Decision, AdmissionError> {
        let now = self.clock.now();
        self.maybe_sweep(now);

        let matched = self.rules.resolve(path);
        let rule = matched.rule;
        let window = seconds(rule.window_seconds())
            .ok_or(AdmissionError::WindowOutOfRange(rule.window_seconds()))?;

        let key = bucket_key(identity, &matched.route_key);
        let bucket = self.buckets.record(&key, window, now);

        let reset = bucket
            .window_start
            .checked_add_signed(window)
            .ok_or(AdmissionError::ResetOverflow(bucket.window_start))?;

        let mut info = RateLimitInfo {
            limit: rule.max_requests(),
            remaining: rule.max_requests().saturating_sub(bucket.count),
            reset_at: ceil_seconds(reset),
            window_seconds: rule.window_seconds(),
            retry_after: None,
        };

        if bucket.count <= rule.max_requests() {
            return Ok(Decision::Allowed(info));
        }

        let wait_ms = (reset - now).num_milliseconds().max(1);
        info.retry_after = Some(u64::try_from((wait_ms + 999) / 1000).unwrap_or(1));
        debug!(
            "Rate limit exceeded for {} on {} ({}/{})",
            identity,
            matched.route_key,
            bucket.count,
            rule.max_requests()
        );
        Ok(Decision::Denied(info))
    }

    /// Runs the eviction sweep if the sweep interval has elapsed.
    fn maybe_sweep(&self, now: DateTime<Utc>) {
        // Another request is already sweeping or just checked.
        let Some(mut last) = self.last_sweep.try_lock() else {
            return;
        };
        if now - *last < self.sweep_interval {
            return;
        }
        *last = now;
        drop(last);

        self.evict(now);
    }

    /// Evicts buckets idle longer than the retention period, regardless of
    /// when the last sweep ran. Returns the number removed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        *self.last_sweep.lock() = now;
        self.evict(now)
    }

    fn evict(&self, now: DateTime<Utc>) -> usize {
        let removed = self.buckets.evict_idle(now - self.retention);
        if removed > 0 {
            debug!(
                "Evicted {} idle rate limit buckets, {} remaining",
                removed,
                self.buckets.len()
            );
        }
        removed
    }

    /// The rule registry, for inspection and administrative replacement.
    #[must_use]
    pub fn rules(&self) -> &RuleRegistry {
        &self.rules
    }

    /// The rule that applies to `path`.
    #[must_use]
    pub fn rule_for(&self, path: &str) -> RateLimitRule {
        self.rules.resolve(path).rule
    }

    /// Number of buckets currently tracked.
    #[must_use]
    pub fn tracked_buckets(&self) -> usize {
        self.buckets.len()
    }

    /// Whether rate limiting is enabled.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

fn seconds(secs: u64) -> Option<Duration> {
    i64::try_from(secs).ok().and_then(Duration::try_seconds)
}

/// Epoch seconds of `at`, rounded up so a reported reset is never early.
fn ceil_seconds(at: DateTime<Utc>) -> i64 {
    at.timestamp() + i64::from(at.timestamp_subsec_nanos() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::{RouteRuleConfig, RuleConfig};
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 3, 9, 30, 0).unwrap()
    }

    fn config() -> RateLimitConfig {
        RateLimitConfig {
            default: RuleConfig {
                max_requests: 100,
                window_seconds: 60,
                burst: None,
            },
            routes: vec![RouteRuleConfig {
                pattern: "/api/v1/signals/parse".to_string(),
                max_requests: 5,
                window_seconds: 60,
                burst: Some(5),
            }],
            ..RateLimitConfig::default()
        }
    }

    fn controller() -> (AdmissionController, ManualClock) {
        let clock = ManualClock::new(t0());
        let controller = AdmissionController::with_clock(&config(), Arc::new(clock.clone()))
            .expect("valid config");
        (controller, clock)
    }

    const PARSE: &str = "/api/v1/signals/parse";

    #[test]
    fn test_first_five_allowed_sixth_denied() {
        let (controller, _clock) = controller();

        for i in 0..5 {
            let decision = controller.check("ip:10.0.0.1", PARSE).unwrap();
            assert!(decision.is_allowed(), "request {} should be allowed", i + 1);
        }

        let decision = controller.check("ip:10.0.0.1", PARSE).unwrap();
        assert!(!decision.is_allowed());
        let info = decision.info();
        assert_eq!(info.remaining, 0);
        assert!(info.retry_after.unwrap() >= 1);
        assert_eq!(info.retry_after, Some(60));
    }

    #[test]
    fn test_metadata_on_allowed_request() {
        let (controller, _clock) = controller();
        let decision = controller.check("user:7", PARSE).unwrap();

        assert_eq!(
            decision,
            Decision::Allowed(RateLimitInfo {
                limit: 5,
                remaining: 4,
                reset_at: t0().timestamp() + 60,
                window_seconds: 60,
                retry_after: None,
            })
        );
    }

    #[test]
    fn test_window_resets_after_elapsed() {
        let (controller, clock) = controller();
        for _ in 0..6 {
            controller.check("ip:10.0.0.1", PARSE).unwrap();
        }
        assert!(!controller.check("ip:10.0.0.1", PARSE).unwrap().is_allowed());

        clock.advance_secs(61);
        let decision = controller.check("ip:10.0.0.1", PARSE).unwrap();
        assert!(decision.is_allowed());
        assert_eq!(decision.info().remaining, 4);
        assert_eq!(decision.info().reset_at, t0().timestamp() + 61 + 60);
    }

    #[test]
    fn test_retry_after_shrinks_with_time_but_never_below_one() {
        let (controller, clock) = controller();
        for _ in 0..5 {
            controller.check("k", PARSE).unwrap();
        }

        clock.advance_secs(45);
        let info = *controller.check("k", PARSE).unwrap().info();
        assert_eq!(info.retry_after, Some(15));

        clock.advance(Duration::milliseconds(14_800));
        let info = *controller.check("k", PARSE).unwrap().info();
        assert_eq!(info.retry_after, Some(1));
    }

    #[test]
    fn test_remaining_never_negative() {
        let (controller, _clock) = controller();
        for n in 1..=20u32 {
            let info = *controller.check("ip:1.1.1.1", PARSE).unwrap().info();
            assert_eq!(info.remaining, 5u32.saturating_sub(n));
        }
    }

    #[test]
    fn test_identities_do_not_share_buckets() {
        let (controller, _clock) = controller();
        for _ in 0..5 {
            assert!(controller.check("user:a", PARSE).unwrap().is_allowed());
        }
        assert!(!controller.check("user:a", PARSE).unwrap().is_allowed());
        assert!(controller.check("user:b", PARSE).unwrap().is_allowed());
        assert_eq!(controller.tracked_buckets(), 2);
    }

    #[test]
    fn test_default_rule_buckets_per_path() {
        let (controller, _clock) = controller();
        controller.check("user:a", "/api/v1/trades").unwrap();
        controller.check("user:a", "/api/v1/accounts").unwrap();
        assert_eq!(controller.tracked_buckets(), 2);
        assert_eq!(controller.rule_for("/api/v1/trades").max_requests(), 100);
    }

    #[test]
    fn test_concurrent_requests_admit_exactly_limit() {
        let (controller, _clock) = controller();
        let allowed = std::sync::atomic::AtomicU32::new(0);
        let denied = std::sync::atomic::AtomicU32::new(0);

        std::thread::scope(|s| {
            for _ in 0..64 {
                s.spawn(|| {
                    let decision = controller.check("ip:9.9.9.9", PARSE).unwrap();
                    let counter = if decision.is_allowed() {
                        &allowed
                    } else {
                        &denied
                    };
                    counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                });
            }
        });

        assert_eq!(allowed.load(std::sync::atomic::Ordering::SeqCst), 5);
        assert_eq!(denied.load(std::sync::atomic::Ordering::SeqCst), 59);
    }

    #[test]
    fn test_bypasses_excluded_paths() {
        let (controller, _clock) = controller();
        assert!(controller.bypasses("/health"));
        assert!(controller.bypasses("/swagger-ui/index.html"));
        assert!(controller.bypasses("/api-docs/openapi.json"));
        assert!(!controller.bypasses("/healthz"));
        assert!(!controller.bypasses(PARSE));
        assert_eq!(controller.tracked_buckets(), 0);
    }

    #[test]
    fn test_disabled_controller_bypasses_everything() {
        let mut config = config();
        config.enabled = false;
        let controller = AdmissionController::new(&config).unwrap();
        assert!(controller.bypasses(PARSE));
        assert!(!controller.is_enabled());
    }

    #[test]
    fn test_sweep_runs_from_hot_path_after_interval() {
        let (controller, clock) = controller();
        controller.check("user:idle", PARSE).unwrap();

        // Past the 1h retention and the 5min sweep interval.
        clock.advance_secs(3600 + 301);
        controller.check("user:active", PARSE).unwrap();

        assert_eq!(controller.tracked_buckets(), 1);
        assert!(
            controller
                .buckets
                .get(&bucket_key("user:active", PARSE))
                .is_some()
        );
    }

    #[test]
    fn test_sweep_keeps_recent_buckets() {
        let (controller, clock) = controller();
        controller.check("user:a", PARSE).unwrap();
        clock.advance_secs(30 * 60);
        controller.check("user:b", PARSE).unwrap();
        clock.advance_secs(31 * 60);

        assert_eq!(controller.sweep(), 1);
        assert!(
            controller
                .buckets
                .get(&bucket_key("user:b", PARSE))
                .is_some()
        );
        assert!(
            controller
                .buckets
                .get(&bucket_key("user:a", PARSE))
                .is_none()
        );
    }

    #[test]
    fn test_sweep_not_run_before_interval() {
        let (controller, clock) = controller();
        controller.check("user:a", PARSE).unwrap();

        clock.advance_secs(3601);
        // A sweep ran ten seconds ago.
        *controller.last_sweep.lock() = clock.now() - Duration::seconds(10);
        controller.check("user:b", PARSE).unwrap();
        assert_eq!(controller.tracked_buckets(), 2);
    }

    #[test]
    fn test_huge_window_rejected_at_construction() {
        let mut config = config();
        config.routes[0].window_seconds = u64::MAX;
        assert!(AdmissionController::new(&config).is_err());
    }

    #[test]
    fn test_window_end_past_time_range_reports_error() {
        let clock = ManualClock::new(DateTime::<Utc>::MAX_UTC);
        let controller = AdmissionController::with_clock(&config(), Arc::new(clock)).unwrap();
        assert!(matches!(
            controller.check("user:a", PARSE),
            Err(AdmissionError::ResetOverflow(_))
        ));
    }

    #[test]
    fn test_retry_after_rounds_partial_seconds_up() {
        let clock = ManualClock::new(t0() + Duration::milliseconds(700));
        let controller =
            AdmissionController::with_clock(&config(), Arc::new(clock.clone())).unwrap();
        for _ in 0..5 {
            assert!(controller.check("k", PARSE).unwrap().is_allowed());
        }

        // Window ends at t0 + 60.7s; 30.5s remain.
        clock.advance(Duration::milliseconds(29_500));
        let decision = controller.check("k", PARSE).unwrap();
        assert!(!decision.is_allowed());
        assert_eq!(decision.info().retry_after, Some(31));
        assert_eq!(decision.info().reset_at, t0().timestamp() + 61);
    }
}
