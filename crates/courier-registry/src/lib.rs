// Subscription registry: session -> topic patterns, plus a destination cache.
//
// The per-session index is the source of truth. The destination cache only
// holds derived copies and is kept in step under a single write lock; every
// path that mutates the index takes that lock first, then the index shard.
use courier_common::SessionId;
use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

mod cache;
mod pattern;

use cache::DestinationCache;
pub use pattern::{PathPattern, PatternError};

/// Immutable snapshot of the sessions matching one destination.
pub type SubscriberSet = Arc<HashSet<SessionId>>;

#[derive(Debug, Default)]
struct SessionPatterns {
    patterns: HashMap<String, PathPattern>,
}

impl SessionPatterns {
    fn matches(&self, destination: &str) -> bool {
        self.patterns
            .values()
            .any(|pattern| pattern.matches(destination))
    }
}

/// Registry of topic subscriptions keyed by session.
///
/// ```
/// use courier_common::SessionId;
/// use courier_registry::SubscriptionRegistry;
///
/// let registry = SubscriptionRegistry::new(1024);
/// let session = SessionId::from("sess01");
/// registry.register_subscription(&session, "/topic/PRICE.STOCK.*.IBM");
/// assert!(registry.find_subscribers("/topic/PRICE.STOCK.NASDAQ.IBM").contains(&session));
/// assert!(registry.find_subscribers("/topic/PRICE.STOCK.NASDAQ.MSFT").is_empty());
/// ```
#[derive(Debug)]
pub struct SubscriptionRegistry {
    sessions: DashMap<SessionId, SessionPatterns>,
    cache: DestinationCache,
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new(courier_common::DEFAULT_CACHE_LIMIT)
    }
}

impl SubscriptionRegistry {
    /// `cache_limit` bounds the number of cached destinations; 0 disables the cache.
    pub fn new(cache_limit: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            cache: DestinationCache::new(cache_limit),
        }
    }

    /// Idempotent. Empty ids or patterns, and patterns that fail to compile,
    /// are ignored.
    pub fn register_subscription(&self, session_id: &SessionId, pattern: &str) {
        if session_id.is_empty() || pattern.is_empty() {
            return;
        }
        let compiled = match PathPattern::parse(pattern) {
            Ok(compiled) => compiled,
            Err(err) => {
                tracing::warn!(session_id = %session_id, pattern, error = %err, "ignoring invalid subscription pattern");
                return;
            }
        };

        let mut cache = self.cache.writer();
        let inserted = {
            let mut entry = self.sessions.entry(session_id.clone()).or_default();
            if entry.patterns.contains_key(pattern) {
                false
            } else {
                cache.add_session(session_id, &compiled);
                entry.patterns.insert(pattern.to_string(), compiled);
                true
            }
        };
        if inserted {
            tracing::debug!(session_id = %session_id, pattern, "subscription registered");
        }
    }

    /// Removes one pattern; the session leaves the index once it has none left.
    pub fn unregister_subscription(&self, session_id: &SessionId, pattern: &str) {
        if session_id.is_empty() || pattern.is_empty() {
            return;
        }
        let mut cache = self.cache.writer();
        let removed = match self.sessions.get_mut(session_id) {
            Some(mut entry) => entry.patterns.remove(pattern).is_some(),
            None => false,
        };
        if !removed {
            return;
        }
        self.sessions
            .remove_if(session_id, |_, entry| entry.patterns.is_empty());

        match self.sessions.get(session_id) {
            Some(remaining) => {
                cache.remove_session(session_id, |destination| remaining.matches(destination))
            }
            None => cache.remove_session(session_id, |_| false),
        }
        tracing::debug!(session_id = %session_id, pattern, "subscription removed");
    }

    /// Drops every pattern of the session. Unknown sessions are a no-op.
    pub fn unregister_session(&self, session_id: &SessionId) {
        let mut cache = self.cache.writer();
        let Some((_, removed)) = self.sessions.remove(session_id) else {
            return;
        };
        cache.remove_session(session_id, |_| false);
        tracing::debug!(
            session_id = %session_id,
            patterns = removed.patterns.len(),
            "session subscriptions removed"
        );
    }

    /// Every session with at least one pattern matching `destination`.
    ///
    /// The result is a snapshot; later registry changes never show through it.
    pub fn find_subscribers(&self, destination: &str) -> SubscriberSet {
        if destination.is_empty() {
            return SubscriberSet::default();
        }
        if !self.cache.is_enabled() {
            return Arc::new(self.scan(destination));
        }
        if let Some(hit) = self.cache.lookup(destination) {
            metrics::counter!("courier_registry_cache_hits_total").increment(1);
            return hit;
        }

        let mut cache = self.cache.writer();
        // Another caller may have populated it while we waited for the lock.
        if let Some(hit) = cache.touch(destination) {
            return hit;
        }
        metrics::counter!("courier_registry_cache_misses_total").increment(1);
        let found = self.scan(destination);
        if found.is_empty() {
            return SubscriberSet::default();
        }
        let found = Arc::new(found);
        cache.insert(destination, Arc::clone(&found));
        found
    }

    pub fn has_subscriptions(&self) -> bool {
        !self.sessions.is_empty()
    }

    /// Patterns currently registered for a session.
    pub fn subscriptions(&self, session_id: &SessionId) -> Vec<String> {
        self.sessions
            .get(session_id)
            .map(|entry| entry.patterns.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn cached_destinations(&self) -> usize {
        self.cache.len()
    }

    // Ground truth: evaluate every pattern of every session.
    fn scan(&self, destination: &str) -> HashSet<SessionId> {
        self.sessions
            .iter()
            .filter(|entry| entry.value().matches(destination))
            .map(|entry| entry.key().clone())
            .collect()
    }
}
