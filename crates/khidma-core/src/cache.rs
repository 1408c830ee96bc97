//! Query cache with tagged-key invalidation
//!
//! An explicit, injectable cache rather than an ambient singleton:
//! views read through it, mutations and change-feed events invalidate
//! by key or per user. Tests construct isolated instances.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::RwLock;

/// Tagged cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// The conversation summary list of a user
    ConversationList(String),
    /// The message list of a conversation
    MessageList(String),
    /// The unread count of a user
    UnreadCount(String),
}

impl CacheKey {
    /// Whether this key belongs to the given user's views
    ///
    /// Message lists are per conversation, not per user, so they only
    /// match via explicit invalidation.
    fn belongs_to_user(&self, user_id: &str) -> bool {
        match self {
            CacheKey::ConversationList(u) | CacheKey::UnreadCount(u) => u == user_id,
            CacheKey::MessageList(_) => false,
        }
    }
}

/// In-memory query cache
///
/// Entries are serde_json values so heterogeneous view results share
/// one store. Interior mutability keeps the handle shareable across
/// the event-loop tasks that read and invalidate it.
#[derive(Debug, Default)]
pub struct QueryCache {
    entries: RwLock<HashMap<CacheKey, serde_json::Value>>,
}

impl QueryCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a cached value, if present and decodable
    pub fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        let entries = self.entries.read().ok()?;
        let value = entries.get(key)?;
        match serde_json::from_value(value.clone()) {
            Ok(decoded) => {
                tracing::trace!(?key, "cache hit");
                Some(decoded)
            }
            Err(e) => {
                tracing::warn!(?key, error = %e, "cache entry failed to decode");
                None
            }
        }
    }

    /// Store a value under a key
    pub fn put<T: Serialize>(&self, key: CacheKey, value: &T) {
        match serde_json::to_value(value) {
            Ok(encoded) => {
                if let Ok(mut entries) = self.entries.write() {
                    entries.insert(key, encoded);
                }
            }
            Err(e) => tracing::warn!(error = %e, "failed to encode cache entry"),
        }
    }

    /// Drop a single entry
    pub fn invalidate(&self, key: &CacheKey) {
        if let Ok(mut entries) = self.entries.write() {
            if entries.remove(key).is_some() {
                tracing::debug!(?key, "cache invalidated");
            }
        }
    }

    /// Drop every per-user entry for the given user
    pub fn invalidate_user(&self, user_id: &str) {
        if let Ok(mut entries) = self.entries.write() {
            entries.retain(|key, _| !key.belongs_to_user(user_id));
        }
    }

    /// Drop everything
    ///
    /// Used when the change feed lags and events were lost.
    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.clear();
        }
    }

    /// Number of cached entries
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_round_trip() {
        let cache = QueryCache::new();
        let key = CacheKey::UnreadCount("u1".to_string());

        assert_eq!(cache.get::<i64>(&key), None);

        cache.put(key.clone(), &7i64);
        assert_eq!(cache.get::<i64>(&key), Some(7));
    }

    #[test]
    fn test_invalidate_single_key() {
        let cache = QueryCache::new();
        let key = CacheKey::MessageList("c1".to_string());

        cache.put(key.clone(), &vec!["a".to_string(), "b".to_string()]);
        assert!(cache.get::<Vec<String>>(&key).is_some());

        cache.invalidate(&key);
        assert!(cache.get::<Vec<String>>(&key).is_none());
    }

    #[test]
    fn test_invalidate_user_keeps_other_users() {
        let cache = QueryCache::new();
        cache.put(CacheKey::ConversationList("u1".to_string()), &1i64);
        cache.put(CacheKey::UnreadCount("u1".to_string()), &2i64);
        cache.put(CacheKey::UnreadCount("u2".to_string()), &3i64);
        cache.put(CacheKey::MessageList("c1".to_string()), &4i64);

        cache.invalidate_user("u1");

        assert!(cache.get::<i64>(&CacheKey::ConversationList("u1".to_string())).is_none());
        assert!(cache.get::<i64>(&CacheKey::UnreadCount("u1".to_string())).is_none());
        assert_eq!(cache.get::<i64>(&CacheKey::UnreadCount("u2".to_string())), Some(3));
        // Message lists are per conversation and survive user invalidation
        assert_eq!(cache.get::<i64>(&CacheKey::MessageList("c1".to_string())), Some(4));
    }

    #[test]
    fn test_clear() {
        let cache = QueryCache::new();
        cache.put(CacheKey::UnreadCount("u1".to_string()), &1i64);
        cache.put(CacheKey::UnreadCount("u2".to_string()), &2i64);
        assert_eq!(cache.len(), 2);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_isolated_instances() {
        let a = QueryCache::new();
        let b = QueryCache::new();
        let key = CacheKey::UnreadCount("u1".to_string());

        a.put(key.clone(), &1i64);
        assert!(b.get::<i64>(&key).is_none());
    }
}
