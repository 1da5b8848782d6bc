// In-memory TTL cache standing in for the shopper's local/session storage:
// checkout prefill data and pending-order redirect markers.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

#[derive(Debug, Clone)]
struct CacheEntry<T> {
    value: T,
    stored_at: DateTime<Utc>,
}

/// A keyed cache whose entries expire after a fixed TTL.
///
/// Expiry is evaluated on read: an expired entry behaves exactly like an
/// absent one and is removed when observed.
#[derive(Debug)]
pub struct TtlCache<T> {
    entries: DashMap<String, CacheEntry<T>>,
    ttl: Duration,
}

impl<T: Clone> TtlCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn insert(&self, key: impl Into<String>, value: T) {
        self.entries.insert(
            key.into(),
            CacheEntry {
                value,
                stored_at: Utc::now(),
            },
        );
    }

    pub fn get(&self, key: &str) -> Option<T> {
        let expired = match self.entries.get(key) {
            Some(entry) => {
                if Utc::now() - entry.stored_at > self.ttl {
                    true
                } else {
                    return Some(entry.value.clone());
                }
            }
            None => return None,
        };
        if expired {
            self.entries.remove(key);
        }
        None
    }

    pub fn remove(&self, key: &str) -> Option<T> {
        self.entries.remove(key).map(|(_, entry)| entry.value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
