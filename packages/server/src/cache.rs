//! In-process response cache keyed by request fingerprint.

use std::{
    collections::HashMap,
    sync::Mutex,
    time::{Duration, Instant},
};

/// A cached response body and its content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    /// Serialized body.
    pub body: String,
    /// `Content-Type` header value.
    pub content_type: &'static str,
    inserted: Instant,
}

/// TTL cache with a size bound; the oldest entry is evicted first.
///
/// A zero TTL or zero capacity disables caching.
#[derive(Debug)]
pub struct ResponseCache {
    ttl: Duration,
    max_entries: usize,
    entries: Mutex<HashMap<String, CachedResponse>>,
}

impl ResponseCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            ttl,
            max_entries,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn enabled(&self) -> bool {
        !self.ttl.is_zero() && self.max_entries > 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, CachedResponse>> {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Returns the live entry for `key`, dropping it if expired.
    pub fn get(&self, key: &str) -> Option<CachedResponse> {
        if !self.enabled() {
            return None;
        }

        let mut entries = self.lock();
        match entries.get(key) {
            Some(entry) if entry.inserted.elapsed() < self.ttl => Some(entry.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Stores a response, evicting the oldest entries past capacity.
    pub fn insert(&self, key: String, body: String, content_type: &'static str) {
        if !self.enabled() {
            return;
        }

        let mut entries = self.lock();
        entries.insert(
            key,
            CachedResponse {
                body,
                content_type,
                inserted: Instant::now(),
            },
        );

        while entries.len() > self.max_entries {
            let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, entry)| entry.inserted)
                .map(|(key, _)| key.clone())
            else {
                break;
            };
            entries.remove(&oldest);
        }
    }

    /// Number of stored entries, including any not yet found expired.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::thread::sleep;

    use super::*;

    #[test]
    fn hit_then_expire() {
        let cache = ResponseCache::new(Duration::from_millis(50), 10);
        cache.insert("k".to_string(), "body".to_string(), "text/csv");

        let hit = cache.get("k").unwrap();
        assert_eq!(hit.body, "body");
        assert_eq!(hit.content_type, "text/csv");

        sleep(Duration::from_millis(80));
        assert!(cache.get("k").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn evicts_oldest_past_capacity() {
        let cache = ResponseCache::new(Duration::from_secs(60), 2);
        cache.insert("a".to_string(), "1".to_string(), "text/csv");
        sleep(Duration::from_millis(2));
        cache.insert("b".to_string(), "2".to_string(), "text/csv");
        sleep(Duration::from_millis(2));
        cache.insert("c".to_string(), "3".to_string(), "text/csv");

        assert_eq!(cache.len(), 2);
        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_some());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn zero_ttl_disables() {
        let cache = ResponseCache::new(Duration::ZERO, 10);
        cache.insert("k".to_string(), "body".to_string(), "text/csv");
        assert!(cache.get("k").is_none());
        assert!(cache.is_empty());
    }
}
