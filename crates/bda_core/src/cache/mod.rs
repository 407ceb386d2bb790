//! In-process response cache.
//!
//! - Keys are SHA-256 hashes of the canonical JSON of the call arguments
//! - Entries expire after a fixed TTL
//! - Over capacity, expired entries go first, then the oldest
//! - Thread-safe; constructed explicitly and shared via `Arc`

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::AppError;

struct CacheEntry {
    value: serde_json::Value,
    inserted_at: Instant,
    expires_at: Instant,
    hits: u64,
}

pub struct ResponseCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    ttl: Duration,
    max_entries: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub total_hits: u64,
    pub ttl_seconds: u64,
    pub max_entries: usize,
}

impl ResponseCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        ResponseCache {
            entries: Mutex::new(HashMap::new()),
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Returns the value if present and not expired. Expired entries are dropped on read.
    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        let now = Instant::now();
        let mut entries = self.lock();
        match entries.get_mut(key) {
            Some(entry) if entry.expires_at > now => {
                entry.hits += 1;
                Some(entry.value.clone())
            }
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn set(&self, key: impl Into<String>, value: serde_json::Value) {
        let now = Instant::now();
        let mut entries = self.lock();
        entries.insert(
            key.into(),
            CacheEntry {
                value,
                inserted_at: now,
                expires_at: now + self.ttl,
                hits: 0,
            },
        );

        if entries.len() > self.max_entries {
            entries.retain(|_, e| e.expires_at > now);
        }
        while entries.len() > self.max_entries {
            let oldest = entries
                .iter()
                .min_by_key(|(_, e)| e.inserted_at)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(k) => {
                    entries.remove(&k);
                }
                None => break,
            }
        }
    }

    pub fn remove(&self, key: &str) -> bool {
        self.lock().remove(key).is_some()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self.lock();
        CacheStats {
            entries: entries.len(),
            total_hits: entries.values().map(|e| e.hits).sum(),
            ttl_seconds: self.ttl.as_secs(),
            max_entries: self.max_entries,
        }
    }
}

/// `<prefix>:<sha256 of the canonical JSON of args>`.
pub fn cache_key<T: Serialize + ?Sized>(prefix: &str, args: &T) -> Result<String, AppError> {
    let json = serde_json::to_string(args).map_err(|e| {
        AppError::new("CACHE_KEY_FAILED", "Failed to serialize cache key arguments")
            .with_details(e.to_string())
    })?;
    let digest = hex::encode(Sha256::digest(json.as_bytes()));
    if prefix.is_empty() {
        Ok(digest)
    } else {
        Ok(format!("{prefix}:{digest}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::thread;

    #[test]
    fn hit_after_set() {
        let cache = ResponseCache::new(Duration::from_secs(60), 10);
        cache.set("k", json!({"a": 1}));
        assert_eq!(cache.get("k"), Some(json!({"a": 1})));
        assert_eq!(cache.get("missing"), None);
        assert_eq!(cache.stats().total_hits, 1);
    }

    #[test]
    fn expired_entries_are_not_returned() {
        let cache = ResponseCache::new(Duration::from_millis(20), 10);
        cache.set("k", json!("v"));
        thread::sleep(Duration::from_millis(40));
        assert_eq!(cache.get("k"), None);
        assert_eq!(cache.stats().entries, 0);
    }

    #[test]
    fn over_capacity_evicts_oldest() {
        let cache = ResponseCache::new(Duration::from_secs(60), 2);
        cache.set("a", json!(1));
        thread::sleep(Duration::from_millis(2));
        cache.set("b", json!(2));
        thread::sleep(Duration::from_millis(2));
        cache.set("c", json!(3));

        assert_eq!(cache.stats().entries, 2);
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("c"), Some(json!(3)));
    }

    #[test]
    fn remove_and_clear() {
        let cache = ResponseCache::new(Duration::from_secs(60), 10);
        cache.set("a", json!(1));
        cache.set("b", json!(2));
        assert!(cache.remove("a"));
        assert!(!cache.remove("a"));
        cache.clear();
        assert_eq!(cache.stats().entries, 0);
    }

    #[test]
    fn keys_are_stable_and_argument_sensitive() {
        let k1 = cache_key("answer", &("q", 1)).expect("key");
        let k2 = cache_key("answer", &("q", 1)).expect("key");
        let k3 = cache_key("answer", &("q", 2)).expect("key");
        assert_eq!(k1, k2);
        assert_ne!(k1, k3);
        assert!(k1.starts_with("answer:"));
        assert_eq!(k1.len(), "answer:".len() + 64);
    }
}
