//! Parent-side half of the StartupCache owner/waiter protocol: ensures
//! at most one worker pays the cost of each expensive startup step.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde_json::Value;

#[derive(Debug, Clone)]
enum CacheState {
    /// Value already known; future requests get an immediate hit.
    Ready(Value),
    /// `owner` is producing the value; `waiters` are queued for the
    /// eventual broadcast.
    Pending {
        owner: String,
        waiters: Vec<String>,
    },
}

/// Outcome the parent sends back in response to a
/// `startup_cache_request`.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheReply {
    Hit(Value),
    Miss,
    Wait,
}

impl CacheReply {
    /// Convert into the wire message the parent sends back over a
    /// worker's `conn` in response to a `StartupCacheRequest { key, request_id }`.
    pub fn into_parent_message(self, key: String, request_id: String) -> forge_protocol::ParentMessage {
        match self {
            CacheReply::Hit(value) => forge_protocol::ParentMessage::StartupCacheHit { key, request_id, value },
            CacheReply::Miss => forge_protocol::ParentMessage::StartupCacheMiss { key, request_id },
            CacheReply::Wait => forge_protocol::ParentMessage::StartupCacheWait { key, request_id },
        }
    }
}

/// Outcome of resolving an owner's update — who gets promoted or
/// broadcast to next, if anyone.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolveOutcome {
    /// Value published; every listed waiter receives a `Hit`.
    BroadcastHit { waiters: Vec<String> },
    /// Owner failed; the next queued waiter becomes the new owner and
    /// must itself try to produce the value.
    PromoteNext { new_owner: String },
    /// Owner failed and there were no waiters left to promote.
    NoWaiters,
}

/// In-memory cache keyed by (worker-visible) key name, tracking exactly
/// one owner and an ordered waiter queue per in-flight key.
#[derive(Default)]
pub struct StartupCache {
    entries: Mutex<HashMap<String, CacheState>>,
}

impl StartupCache {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// A worker identified by `worker_id` is requesting `key`.
    pub fn request(&self, key: &str, worker_id: &str) -> CacheReply {
        let mut entries = self.entries.lock();
        match entries.get_mut(key) {
            Some(CacheState::Ready(value)) => CacheReply::Hit(value.clone()),
            Some(CacheState::Pending { waiters, .. }) => {
                waiters.push(worker_id.to_string());
                CacheReply::Wait
            }
            None => {
                entries.insert(
                    key.to_string(),
                    CacheState::Pending {
                        owner: worker_id.to_string(),
                        waiters: Vec::new(),
                    },
                );
                CacheReply::Miss
            }
        }
    }

    /// The owner of `key` published a value. Returns the waiters that
    /// should receive a broadcast `Hit` and the ack to send the owner.
    pub fn resolve_success(&self, key: &str, value: Value) -> ResolveOutcome {
        let mut entries = self.entries.lock();
        let waiters = match entries.remove(key) {
            Some(CacheState::Pending { waiters, .. }) => waiters,
            _ => Vec::new(),
        };
        entries.insert(key.to_string(), CacheState::Ready(value));
        ResolveOutcome::BroadcastHit { waiters }
    }

    /// The owner of `key` failed to produce the value. Promotes the
    /// next waiter to owner, if any.
    pub fn resolve_failure(&self, key: &str) -> ResolveOutcome {
        let mut entries = self.entries.lock();
        match entries.get_mut(key) {
            Some(CacheState::Pending { owner, waiters }) => {
                if waiters.is_empty() {
                    entries.remove(key);
                    ResolveOutcome::NoWaiters
                } else {
                    let new_owner = waiters.remove(0);
                    *owner = new_owner.clone();
                    ResolveOutcome::PromoteNext { new_owner }
                }
            }
            _ => ResolveOutcome::NoWaiters,
        }
    }

    /// Drop a connection that has gone away. If it was the current
    /// owner, promote the next waiter (mirroring `resolve_failure`); if
    /// it was only queued, it is simply removed from the waiter list.
    pub fn prune_connection(&self, worker_id: &str) {
        let mut entries = self.entries.lock();
        let keys: Vec<String> = entries.keys().cloned().collect();
        for key in keys {
            let promote = match entries.get_mut(&key) {
                Some(CacheState::Pending { owner, waiters }) => {
                    waiters.retain(|w| w != worker_id);
                    if owner == worker_id {
                        if waiters.is_empty() {
                            true
                        } else {
                            let new_owner = waiters.remove(0);
                            *owner = new_owner;
                            false
                        }
                    } else {
                        false
                    }
                }
                _ => false,
            };
            if promote {
                entries.remove(&key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_reply_converts_to_matching_parent_message() {
        use forge_protocol::ParentMessage;

        let hit = CacheReply::Hit(serde_json::json!({"ok": true}))
            .into_parent_message("catalog".into(), "req-1".into());
        assert!(matches!(hit, ParentMessage::StartupCacheHit { key, request_id, .. }
            if key == "catalog" && request_id == "req-1"));

        let miss = CacheReply::Miss.into_parent_message("catalog".into(), "req-2".into());
        assert!(matches!(miss, ParentMessage::StartupCacheMiss { .. }));

        let wait = CacheReply::Wait.into_parent_message("catalog".into(), "req-3".into());
        assert!(matches!(wait, ParentMessage::StartupCacheWait { .. }));
    }

    #[test]
    fn first_requester_becomes_owner() {
        let cache = StartupCache::new();
        assert_eq!(cache.request("catalog", "w1"), CacheReply::Miss);
    }

    #[test]
    fn second_requester_waits() {
        let cache = StartupCache::new();
        cache.request("catalog", "w1");
        assert_eq!(cache.request("catalog", "w2"), CacheReply::Wait);
    }

    #[test]
    fn later_requesters_see_cached_hit() {
        let cache = StartupCache::new();
        cache.request("catalog", "w1");
        cache.resolve_success("catalog", serde_json::json!({"models": []}));
        let reply = cache.request("catalog", "w3");
        assert_eq!(reply, CacheReply::Hit(serde_json::json!({"models": []})));
    }

    #[test]
    fn resolve_success_broadcasts_to_waiters() {
        let cache = StartupCache::new();
        cache.request("catalog", "w1");
        cache.request("catalog", "w2");
        cache.request("catalog", "w3");
        let outcome = cache.resolve_success("catalog", serde_json::json!(42));
        match outcome {
            ResolveOutcome::BroadcastHit { waiters } => {
                assert_eq!(waiters, vec!["w2".to_string(), "w3".to_string()]);
            }
            _ => panic!("expected broadcast"),
        }
    }

    #[test]
    fn resolve_failure_promotes_next_waiter() {
        let cache = StartupCache::new();
        cache.request("catalog", "w1");
        cache.request("catalog", "w2");
        let outcome = cache.resolve_failure("catalog");
        assert_eq!(
            outcome,
            ResolveOutcome::PromoteNext {
                new_owner: "w2".to_string()
            }
        );
        // The promoted owner now owns the retry; a third worker waits.
        assert_eq!(cache.request("catalog", "w3"), CacheReply::Wait);
    }

    #[test]
    fn resolve_failure_with_no_waiters_drops_entry() {
        let cache = StartupCache::new();
        cache.request("catalog", "w1");
        let outcome = cache.resolve_failure("catalog");
        assert_eq!(outcome, ResolveOutcome::NoWaiters);
        // Entry is gone, so the next request becomes a fresh owner.
        assert_eq!(cache.request("catalog", "w2"), CacheReply::Miss);
    }

    #[test]
    fn pruning_owner_promotes_next_waiter() {
        let cache = StartupCache::new();
        cache.request("catalog", "w1");
        cache.request("catalog", "w2");
        cache.prune_connection("w1");
        // w2 is now owner; a new requester waits rather than becoming owner.
        assert_eq!(cache.request("catalog", "w3"), CacheReply::Wait);
    }

    #[test]
    fn pruning_waiter_just_removes_it() {
        let cache = StartupCache::new();
        cache.request("catalog", "w1");
        cache.request("catalog", "w2");
        cache.prune_connection("w2");
        let outcome = cache.resolve_failure("catalog");
        assert_eq!(outcome, ResolveOutcome::NoWaiters);
    }
}
