use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

use quiz_core::Clock;

/// Every report cache key starts with this prefix, so finalize/delete can
/// invalidate the whole report layer in one call.
pub const REPORT_CACHE_PREFIX: &str = "reports";

/// Default time-to-live for cached dashboard payloads.
#[must_use]
pub fn default_ttl() -> Duration {
    Duration::minutes(5)
}

/// Builds a cache key from a function name and its filter parameters.
///
/// Parameters are sorted so equivalent filters always map to the same key,
/// and joined with explicit separators so distinct filters cannot collide.
#[must_use]
pub fn cache_key(function: &str, params: &[(&'static str, String)]) -> String {
    let mut params: Vec<_> = params.to_vec();
    params.sort();
    let mut key = format!("{REPORT_CACHE_PREFIX}:{function}");
    for (name, value) in params {
        key.push_str(&format!(";{name}={value}"));
    }
    key
}

/// Advisory cache port for derived report payloads.
///
/// Correctness never depends on this: a miss recomputes the identical
/// payload. Implementations are free to drop entries at any time.
pub trait ReportCache: Send + Sync {
    fn get(&self, key: &str) -> Option<serde_json::Value>;
    fn set(&self, key: &str, value: serde_json::Value, ttl: Duration);
    fn invalidate(&self, prefix: &str);
}

/// In-process cache with per-entry expiry.
pub struct MemoryCache {
    clock: Clock,
    entries: Mutex<HashMap<String, (DateTime<Utc>, serde_json::Value)>>,
}

impl MemoryCache {
    #[must_use]
    pub fn new(clock: Clock) -> Self {
        Self {
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl ReportCache for MemoryCache {
    fn get(&self, key: &str) -> Option<serde_json::Value> {
        let guard = self.entries.lock().ok()?;
        let (expires_at, value) = guard.get(key)?;
        if *expires_at <= self.clock.now() {
            return None;
        }
        Some(value.clone())
    }

    fn set(&self, key: &str, value: serde_json::Value, ttl: Duration) {
        if let Ok(mut guard) = self.entries.lock() {
            guard.insert(key.to_owned(), (self.clock.now() + ttl, value));
        }
    }

    fn invalidate(&self, prefix: &str) {
        if let Ok(mut guard) = self.entries.lock() {
            guard.retain(|key, _| !key.starts_with(prefix));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiz_core::time::fixed_now;
    use serde_json::json;

    #[test]
    fn keys_are_order_insensitive_and_collision_free() {
        let a = cache_key(
            "overview",
            &[("date_from", "2024-01-01".into()), ("course", "1".into())],
        );
        let b = cache_key(
            "overview",
            &[("course", "1".into()), ("date_from", "2024-01-01".into())],
        );
        assert_eq!(a, b);
        assert!(a.starts_with(REPORT_CACHE_PREFIX));

        let c = cache_key("overview", &[("course", "12".into())]);
        let d = cache_key("overview", &[("course", "1".into()), ("x", "2".into())]);
        assert_ne!(c, d);
    }

    #[test]
    fn entries_expire_after_their_ttl() {
        let cache = MemoryCache::new(Clock::fixed(fixed_now()));
        cache.set("reports:live", json!({"n": 1}), Duration::minutes(5));
        assert_eq!(cache.get("reports:live"), Some(json!({"n": 1})));

        // an entry whose ttl has already elapsed reads as a miss
        cache.set("reports:stale", json!({"n": 2}), Duration::zero());
        assert!(cache.get("reports:stale").is_none());
    }

    #[test]
    fn invalidate_removes_matching_prefix_only() {
        let cache = MemoryCache::new(Clock::fixed(fixed_now()));
        cache.set("reports:overview", json!(1), default_ttl());
        cache.set("reports:courses", json!(2), default_ttl());
        cache.set("unrelated", json!(3), default_ttl());

        cache.invalidate(REPORT_CACHE_PREFIX);
        assert!(cache.get("reports:overview").is_none());
        assert!(cache.get("reports:courses").is_none());
        assert!(cache.get("unrelated").is_some());
    }
}
