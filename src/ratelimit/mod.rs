//! Admission control: rule registry, bucket store and the fixed-window controller.

pub mod bucket;
pub mod controller;
pub mod rules;

pub use bucket::{Bucket, BucketStore};
pub use controller::{AdmissionController, AdmissionError, Decision, RateLimitInfo};
pub use rules::{MAX_WINDOW_SECONDS, MatchKind, RateLimitRule, RuleError, RuleMatch, RuleRegistry};
