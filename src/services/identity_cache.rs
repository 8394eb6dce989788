//! Cache-aside layer in front of account lookups.
//!
//! The durable store is authoritative. A miss or an unavailable backend both
//! fall through to the store, and write-backs are best-effort.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::clients::cache::{CacheClient, CacheError};
use crate::db::Store;
use crate::domain::AccountId;
use crate::models::Account;
use crate::services::auth_service::AuthError;

/// Outcome of a cache read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup {
    Hit(Account),
    Miss,
    /// The backend failed or held an undecodable entry.
    Unavailable,
}

#[derive(Clone)]
pub struct IdentityCache {
    client: Arc<dyn CacheClient>,
    prefix: String,
    ttl: Duration,
}

impl IdentityCache {
    #[must_use]
    pub fn new(client: Arc<dyn CacheClient>, prefix: impl Into<String>, ttl: Duration) -> Self {
        Self {
            client,
            prefix: prefix.into(),
            ttl,
        }
    }

    #[must_use]
    pub fn key(&self, id: AccountId) -> String {
        format!("{}:account:{id}", self.prefix)
    }

    pub async fn get(&self, id: AccountId) -> CacheLookup {
        let key = self.key(id);
        match self.client.get(&key).await {
            Ok(None) => CacheLookup::Miss,
            Ok(Some(payload)) => match serde_json::from_str::<Account>(&payload) {
                Ok(account) => CacheLookup::Hit(account),
                Err(e) => {
                    warn!(key, error = %e, "Undecodable identity cache entry");
                    CacheLookup::Unavailable
                }
            },
            Err(e) => {
                warn!(key, error = %e, "Identity cache read failed");
                CacheLookup::Unavailable
            }
        }
    }

    pub async fn put(&self, account: &Account) {
        let key = self.key(account.id);
        let payload = match serde_json::to_string(account) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(key, error = %e, "Failed to encode identity for cache");
                return;
            }
        };

        if let Err(e) = self.client.set(&key, &payload, self.ttl).await {
            warn!(key, error = %e, "Identity cache write failed");
        }
    }

    /// Drops the entry. Call only after the durable write has committed.
    pub async fn invalidate(&self, id: AccountId) {
        let key = self.key(id);
        if let Err(e) = self.client.delete(&key).await {
            error!(key, error = %e, "Identity cache invalidation failed; entry may be stale until TTL");
        }
    }

    pub async fn ping(&self) -> Result<(), CacheError> {
        self.client.ping().await
    }

    /// Cached account, or the store's copy written back to the cache.
    pub async fn resolve(&self, store: &Store, id: AccountId) -> Result<Account, AuthError> {
        if let CacheLookup::Hit(account) = self.get(id).await {
            debug!(account_id = %id, "Identity cache hit");
            return Ok(account);
        }

        let account = store
            .get_account(id)
            .await?
            .ok_or_else(|| AuthError::NotFound(format!("Account {id} not found")))?
            .sanitized();

        self.put(&account).await;
        Ok(account)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use async_trait::async_trait;

    /// Backend whose every call fails.
    pub struct FailingCache;

    #[async_trait]
    impl CacheClient for FailingCache {
        async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
            Err(CacheError::Backend("connection refused".to_string()))
        }

        async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<(), CacheError> {
            Err(CacheError::Backend("connection refused".to_string()))
        }

        async fn delete(&self, _key: &str) -> Result<(), CacheError> {
            Err(CacheError::Backend("connection refused".to_string()))
        }

        async fn ping(&self) -> Result<(), CacheError> {
            Err(CacheError::Backend("connection refused".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::FailingCache;
    use super::*;
    use crate::clients::cache::MemoryCache;
    use crate::db::CreateAccount;
    use crate::db::test_support::memory_store;
    use crate::models::NewAccount;

    async fn store_with_account() -> (Store, Account) {
        let store = memory_store().await;
        let input = NewAccount {
            email: "a@x.com".to_string(),
            password: "unused".to_string(),
            ..NewAccount::default()
        };
        let CreateAccount::Created(account) = store
            .create_account(&input, "$argon2id$fake", None)
            .await
            .unwrap()
        else {
            panic!("expected insert");
        };
        (store, account)
    }

    fn memory_cache() -> IdentityCache {
        IdentityCache::new(Arc::new(MemoryCache::new()), "test", Duration::from_secs(60))
    }

    #[tokio::test]
    async fn put_then_get_hits_and_invalidate_misses() {
        let (_, account) = store_with_account().await;
        let cache = memory_cache();

        assert_eq!(cache.get(account.id).await, CacheLookup::Miss);
        cache.put(&account).await;

        let CacheLookup::Hit(cached) = cache.get(account.id).await else {
            panic!("expected hit");
        };
        assert_eq!(cached.email, "a@x.com");
        assert!(cached.password_hash.is_empty());

        cache.invalidate(account.id).await;
        assert_eq!(cache.get(account.id).await, CacheLookup::Miss);
    }

    #[test]
    fn keys_are_namespaced() {
        let cache = memory_cache();
        let id = AccountId::generate();
        assert_eq!(cache.key(id), format!("test:account:{id}"));
    }

    #[tokio::test]
    async fn undecodable_entry_is_unavailable() {
        let client = Arc::new(MemoryCache::new());
        let cache = IdentityCache::new(client.clone(), "test", Duration::from_secs(60));
        let id = AccountId::generate();
        client
            .set(&cache.key(id), "{not json", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(cache.get(id).await, CacheLookup::Unavailable);
    }

    #[tokio::test]
    async fn failing_backend_still_resolves_from_store() {
        let (store, account) = store_with_account().await;
        let cache = IdentityCache::new(Arc::new(FailingCache), "test", Duration::from_secs(60));

        assert_eq!(cache.get(account.id).await, CacheLookup::Unavailable);
        cache.put(&account).await;
        cache.invalidate(account.id).await;

        let resolved = cache.resolve(&store, account.id).await.unwrap();
        assert_eq!(resolved.id, account.id);
        assert!(resolved.password_hash.is_empty());
    }

    #[tokio::test]
    async fn resolve_writes_back_on_miss() {
        let (store, account) = store_with_account().await;
        let cache = memory_cache();

        cache.resolve(&store, account.id).await.unwrap();
        assert!(matches!(cache.get(account.id).await, CacheLookup::Hit(_)));
    }

    #[tokio::test]
    async fn resolve_unknown_account_is_not_found() {
        let (store, _) = store_with_account().await;
        let cache = memory_cache();
        assert!(matches!(
            cache.resolve(&store, AccountId::generate()).await,
            Err(AuthError::NotFound(_))
        ));
    }
}
