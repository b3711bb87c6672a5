//! Memoized resolver from user id to display identity.
//!
//! Session-wide and append-only: a resolved identity is never refetched
//! or invalidated. A failed lookup degrades to a truncated-id placeholder
//! for that call without poisoning the cache, so a later lookup can still
//! succeed. The cache is an explicit object owned by the engine root, with
//! a reset hook so tests can isolate state.

use std::collections::HashMap;
use std::sync::RwLock;

use realboard_core::types::UserIdentity;

use crate::api::BoardApi;

#[derive(Default)]
pub struct UserDirectory {
    cache: RwLock<HashMap<String, UserIdentity>>,
}

impl UserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve an id to a display identity, hitting the API only on a
    /// cache miss. Never fails: lookup errors yield a placeholder.
    pub async fn resolve<A: BoardApi>(&self, api: &A, user_id: &str) -> UserIdentity {
        if let Some(found) = self.cache.read().unwrap().get(user_id) {
            return found.clone();
        }
        match api.fetch_user(user_id).await {
            Ok(identity) => {
                self.cache
                    .write()
                    .unwrap()
                    .insert(user_id.to_string(), identity.clone());
                identity
            }
            Err(e) => {
                log::warn!("[directory] Lookup failed for {}: {}", user_id, e);
                UserIdentity::placeholder(user_id)
            }
        }
    }

    /// Resolve many ids, preserving order. Duplicates hit the cache.
    pub async fn resolve_all<A: BoardApi>(&self, api: &A, user_ids: &[String]) -> Vec<UserIdentity> {
        let mut out = Vec::with_capacity(user_ids.len());
        for id in user_ids {
            out.push(self.resolve(api, id).await);
        }
        out
    }

    /// Pre-seed an identity, e.g. the local user from config.
    pub fn insert(&self, identity: UserIdentity) {
        self.cache
            .write()
            .unwrap()
            .insert(identity.id.clone(), identity);
    }

    pub fn len(&self) -> usize {
        self.cache.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.read().unwrap().is_empty()
    }

    /// Drop every cached identity. Test/session-boundary hook.
    pub fn reset(&self) {
        self.cache.write().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MockApi;

    #[tokio::test]
    async fn test_resolve_caches_successes() {
        let api = MockApi::new();
        api.add_user(UserIdentity::new("u-1", "Ada"));
        let dir = UserDirectory::new();

        let first = dir.resolve(&api, "u-1").await;
        assert_eq!(first.name, "Ada");
        assert_eq!(api.user_fetch_count(), 1);

        let second = dir.resolve(&api, "u-1").await;
        assert_eq!(second.name, "Ada");
        assert_eq!(api.user_fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_lookup_degrades_without_caching() {
        let api = MockApi::new();
        let dir = UserDirectory::new();

        let got = dir.resolve(&api, "u-deadbeef").await;
        assert_eq!(got.name, "u-deadbe…");
        assert!(dir.is_empty());

        api.add_user(UserIdentity::new("u-deadbeef", "Grace"));
        let retry = dir.resolve(&api, "u-deadbeef").await;
        assert_eq!(retry.name, "Grace");
    }

    #[tokio::test]
    async fn test_reset_clears_cache() {
        let api = MockApi::new();
        api.add_user(UserIdentity::new("u-1", "Ada"));
        let dir = UserDirectory::new();
        dir.resolve(&api, "u-1").await;
        assert_eq!(dir.len(), 1);
        dir.reset();
        assert!(dir.is_empty());
    }
}
