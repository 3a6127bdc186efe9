//! Shared cache of count results.

use moka::sync::Cache as MokaCache;
use std::time::Duration;

use crate::constants;

/// Count cache keyed by `namespace:service:options`.
///
/// Counts are advisory: a cached value may lag writes by up to the TTL.
#[derive(Clone)]
pub struct CountCache {
    counts: MokaCache<String, u64>,
}

impl Default for CountCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(constants::COUNT_CACHE_TTL_SECS), 100_000)
    }
}

impl CountCache {
    /// Create a cache with the given entry lifetime and capacity.
    pub fn new(ttl: Duration, max_capacity: u64) -> Self {
        let counts = MokaCache::builder()
            .max_capacity(max_capacity)
            .time_to_live(ttl)
            .build();
        Self { counts }
    }

    /// Cache key of a count.
    pub fn key(namespace: &str, service: &str, options: &impl std::fmt::Debug) -> String {
        format!("{namespace}:{service}:{options:?}")
    }

    /// Cached count, if present and fresh.
    pub fn get(&self, key: &str) -> Option<u64> {
        self.counts.get(key)
    }

    /// Store a count.
    pub fn insert(&self, key: String, count: u64) {
        self.counts.insert(key, count);
    }

    /// Drop every cached count of a namespace.
    pub fn invalidate_namespace(&self, namespace: &str) {
        let prefix = format!("{namespace}:");
        let stale: Vec<String> = self
            .counts
            .iter()
            .filter(|(key, _)| key.starts_with(&prefix))
            .map(|(key, _)| key.as_ref().clone())
            .collect();
        for key in stale {
            self.counts.invalidate(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_insert() {
        let cache = CountCache::default();
        let key = CountCache::key("app_1_1", "users", &Some(true));
        assert_eq!(cache.get(&key), None);

        cache.insert(key.clone(), 3);
        assert_eq!(cache.get(&key), Some(3));
    }

    #[test]
    fn test_expiry() {
        let cache = CountCache::new(Duration::from_millis(10), 10);
        cache.insert("k".into(), 1);
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn test_invalidate_namespace() {
        let cache = CountCache::default();
        cache.insert("app_1_1:users:x".into(), 1);
        cache.insert("app_1_2:users:x".into(), 2);

        cache.invalidate_namespace("app_1_1");
        assert_eq!(cache.get("app_1_1:users:x"), None);
        assert_eq!(cache.get("app_1_2:users:x"), Some(2));
    }
}
