//! Fixed-window counting buckets keyed by `identity:route`.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

/// Counting state for one `(identity, route)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bucket {
    /// Requests observed in the current window.
    pub count: u32,
    /// Start of the current window.
    pub window_start: DateTime<Utc>,
    /// Time of the most recent request.
    pub last_access: DateTime<Utc>,
}

impl Bucket {
    fn fresh(now: DateTime<Utc>) -> Self {
        Self {
            count: 0,
            window_start: now,
            last_access: now,
        }
    }
}

/// Builds the bucket key for an identity and route key.
#[must_use]
pub fn bucket_key(identity: &str, route_key: &str) -> String {
    format!("{}:{}", identity, route_key)
}

/// Concurrent map of buckets.
///
/// Each [`BucketStore::record`] runs under the write lock of the shard owning
/// the key, so concurrent requests for the same key are serialized while
/// requests for keys in other shards proceed in parallel.
#[derive(Debug, Default)]
pub struct BucketStore {
    buckets: DashMap<String, Bucket>,
}

impl BucketStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buckets: DashMap::new(),
        }
    }

    /// Records one request against `key` and returns the updated bucket.
    ///
    /// Rolls the window over when `now - window_start >= window`.
    pub fn record(&self, key: &str, window: Duration, now: DateTime<Utc>) -> Bucket {
        let mut entry = self
            .buckets
            .entry(key.to_string())
            .or_insert_with(|| Bucket::fresh(now));
        let bucket = entry.value_mut();

        if now - bucket.window_start >= window {
            bucket.window_start = now;
            bucket.count = 1;
        } else {
            bucket.count = bucket.count.saturating_add(1);
        }
        bucket.last_access = now;

        *bucket
    }

    /// Removes buckets last accessed before `cutoff`. Returns the number removed.
    pub fn evict_idle(&self, cutoff: DateTime<Utc>) -> usize {
        let before = self.buckets.len();
        self.buckets.retain(|_, bucket| bucket.last_access >= cutoff);
        before.saturating_sub(self.buckets.len())
    }

    /// Returns a copy of the bucket for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Bucket> {
        self.buckets.get(key).map(|b| *b)
    }

    /// Number of tracked buckets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// Whether no buckets are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}
