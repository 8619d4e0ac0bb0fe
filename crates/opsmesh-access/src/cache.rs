//! ---
//! mesh_section: "04-access-control"
//! mesh_subsection: "module"
//! mesh_type: "source"
//! mesh_scope: "code"
//! mesh_description: "Permission resolution, role management, and audit trail."
//! mesh_version: "v0.1.0"
//! mesh_owner: "tbd"
//! ---
//! TTL cache for resolved permission sets.
//!
//! Freshness is time-based only: entries expire after the configured TTL and
//! are evicted lazily on lookup. There is no capacity bound; the population
//! is the active user base, which is small next to the cost of a remote
//! round trip. Mutation paths call [`PermissionCache::invalidate`] so their
//! own actor sees the change immediately; other processes converge within
//! one TTL.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::resolver::PermissionSet;

struct CacheEntry {
    value: Arc<PermissionSet>,
    inserted_at: Instant,
}

/// Keyed by user id; stores the fully resolved permission set.
pub struct PermissionCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl PermissionCache {
    /// Create a cache with the given time-to-live.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Fresh entry for the user, if any. Expired entries are removed here
    /// rather than by a background sweeper.
    pub fn get(&self, user_id: &str) -> Option<Arc<PermissionSet>> {
        let mut entries = self.entries.lock();
        match entries.get(user_id) {
            Some(entry) if entry.inserted_at.elapsed() < self.ttl => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(user_id);
                None
            }
            None => None,
        }
    }

    /// Store a freshly resolved set, replacing any previous entry.
    pub fn insert(&self, user_id: &str, value: Arc<PermissionSet>) {
        self.entries.lock().insert(
            user_id.to_owned(),
            CacheEntry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Drop one user's entry (called after any mutation touching them).
    pub fn invalidate(&self, user_id: &str) {
        self.entries.lock().remove(user_id);
    }

    /// Drop everything (role or permission definitions changed).
    pub fn invalidate_all(&self) {
        self.entries.lock().clear();
    }

    /// Number of live entries, counting expired-but-unswept ones.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the cache holds no entries at all.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opsmesh_common::time::utc_now;

    fn empty_set(user_id: &str) -> Arc<PermissionSet> {
        Arc::new(PermissionSet {
            user_id: user_id.to_owned(),
            role_codes: Vec::new(),
            permissions: Vec::new(),
            resolved_at: utc_now(),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let cache = PermissionCache::new(Duration::from_secs(300));
        cache.insert("u1", empty_set("u1"));
        assert!(cache.get("u1").is_some());

        tokio::time::advance(Duration::from_secs(299)).await;
        assert!(cache.get("u1").is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cache.get("u1").is_none());
        // Lazy eviction removed the stale entry on lookup.
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn invalidation_is_immediate_and_scoped() {
        let cache = PermissionCache::new(Duration::from_secs(300));
        cache.insert("u1", empty_set("u1"));
        cache.insert("u2", empty_set("u2"));

        cache.invalidate("u1");
        assert!(cache.get("u1").is_none());
        assert!(cache.get("u2").is_some());

        cache.invalidate_all();
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn insert_replaces_and_restarts_the_clock() {
        let cache = PermissionCache::new(Duration::from_secs(300));
        cache.insert("u1", empty_set("u1"));
        tokio::time::advance(Duration::from_secs(200)).await;
        cache.insert("u1", empty_set("u1"));
        tokio::time::advance(Duration::from_secs(200)).await;
        assert!(cache.get("u1").is_some());
        assert_eq!(cache.len(), 1);
    }
}
