use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;

use crate::clients::cache::{self, CacheClient};
use crate::clients::object_storage::{ObjectStorage, ObjectStoreClient};
use crate::config::Config;
use crate::db::Store;
use crate::services::{
    AuthGuard, AuthService, BearerStrategy, CredentialService, IdentityCache, SeaOrmAuthService,
    SessionCookieStrategy, SessionRegistry,
};

/// Long-lived components shared by every request.
#[derive(Clone)]
pub struct SharedState {
    pub config: Arc<Config>,

    pub store: Store,

    pub cache: IdentityCache,

    pub storage: Arc<dyn ObjectStorage>,

    pub credentials: Arc<CredentialService>,

    pub sessions: SessionRegistry,

    pub auth_service: Arc<dyn AuthService>,
}

impl SharedState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let store = Store::from_config(&config.database)
            .await
            .context("Failed to open database")?;

        let cache_client = cache::connect(&config.cache)
            .await
            .context("Failed to connect identity cache")?;

        let storage: Arc<dyn ObjectStorage> = Arc::new(
            ObjectStoreClient::from_config(&config.storage)
                .context("Failed to configure object storage")?,
        );

        Ok(Self::with_backends(config, store, cache_client, storage))
    }

    /// Wires services over already-constructed backends.
    #[must_use]
    pub fn with_backends(
        config: Config,
        store: Store,
        cache_client: Arc<dyn CacheClient>,
        storage: Arc<dyn ObjectStorage>,
    ) -> Self {
        let cache = IdentityCache::new(
            cache_client,
            config.cache.key_prefix.clone(),
            Duration::from_secs(config.cache.identity_ttl_seconds),
        );

        let credentials = Arc::new(CredentialService::new(
            config.auth.clone(),
            config.security.clone(),
        ));

        let auth_service: Arc<dyn AuthService> = Arc::new(SeaOrmAuthService::new(
            store.clone(),
            credentials.clone(),
            cache.clone(),
            storage.clone(),
            &config,
        ));

        Self {
            sessions: SessionRegistry::new(store.clone()),
            config: Arc::new(config),
            store,
            cache,
            storage,
            credentials,
            auth_service,
        }
    }

    #[must_use]
    pub fn bearer_guard(&self) -> AuthGuard {
        AuthGuard::bearer(BearerStrategy::new(
            self.credentials.clone(),
            self.cache.clone(),
            self.store.clone(),
            self.config.auth.token_cookie_name.clone(),
        ))
    }

    #[must_use]
    pub fn session_guard(&self) -> AuthGuard {
        AuthGuard::session_cookie(SessionCookieStrategy::new(
            self.sessions.clone(),
            self.cache.clone(),
            self.store.clone(),
            self.config.auth.session_cookie_name.clone(),
        ))
    }
}
