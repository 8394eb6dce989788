//! `SeaORM` implementation of the `AuthService` trait.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use url::Url;

use crate::clients::object_storage::ObjectStorage;
use crate::config::Config;
use crate::db::{CreateAccount, Store};
use crate::domain::{AccountId, AvatarId, normalize_email};
use crate::models::{Account, NewAccount, UploadInput};
use crate::services::auth_guard::BearerStrategy;
use crate::services::auth_service::{
    AuthError, AuthFailure, AuthResult, AuthService, Principal, RefreshResult,
};
use crate::services::avatar_pipeline::AvatarPipeline;
use crate::services::credentials::{CredentialService, TokenKind};
use crate::services::identity_cache::IdentityCache;
use crate::services::session_registry::SessionRegistry;

const DUPLICATE_EMAIL: &str = "User with given email already exists";

fn record(event: &'static str, result: &Result<impl Sized, AuthError>) {
    let outcome = match result {
        Ok(_) => "success",
        Err(AuthError::Unauthorized(reason)) => reason.as_str(),
        Err(AuthError::Validation(_)) => "validation",
        Err(AuthError::Conflict(_)) => "conflict",
        Err(AuthError::NotFound(_)) => "not_found",
        Err(AuthError::Infrastructure(_)) => "error",
    };
    metrics::counter!("auth_events_total", "event" => event, "outcome" => outcome).increment(1);
}

pub struct SeaOrmAuthService {
    store: Store,
    credentials: Arc<CredentialService>,
    sessions: SessionRegistry,
    cache: IdentityCache,
    avatars: AvatarPipeline,
    bearer: BearerStrategy,
    min_password_length: usize,
    default_avatar_path: Option<String>,
}

impl SeaOrmAuthService {
    #[must_use]
    pub fn new(
        store: Store,
        credentials: Arc<CredentialService>,
        cache: IdentityCache,
        storage: Arc<dyn ObjectStorage>,
        config: &Config,
    ) -> Self {
        let bearer = BearerStrategy::new(
            credentials.clone(),
            cache.clone(),
            store.clone(),
            config.auth.token_cookie_name.clone(),
        );
        let avatars = AvatarPipeline::new(
            store.clone(),
            storage,
            cache.clone(),
            config.storage.clone(),
        );

        Self {
            sessions: SessionRegistry::new(store.clone()),
            store,
            credentials,
            cache,
            avatars,
            bearer,
            min_password_length: config.security.min_password_length,
            default_avatar_path: config.storage.default_avatar_path.clone(),
        }
    }

    fn validate_registration(&self, input: &NewAccount) -> Result<(), AuthError> {
        let email = input.email.trim();
        if email.is_empty() {
            return Err(AuthError::Validation("Email is required".to_string()));
        }
        match email.split_once('@') {
            Some((local, domain)) if !local.is_empty() && domain.contains('.') => {}
            _ => return Err(AuthError::Validation("Email is not valid".to_string())),
        }

        if input.password.chars().count() < self.min_password_length {
            return Err(AuthError::Validation(format!(
                "Password must be at least {} characters",
                self.min_password_length
            )));
        }

        Ok(())
    }

    async fn default_avatar(&self) -> Result<Option<AvatarId>, AuthError> {
        let Some(path) = self.default_avatar_path.as_deref() else {
            return Ok(None);
        };

        match self.store.get_avatar_by_file_path(path).await? {
            Some(avatar) => Ok(Some(avatar.id)),
            None => {
                warn!(path, "Default avatar is configured but has no avatar row");
                Ok(None)
            }
        }
    }

    /// Removes an account whose registration could not open a session, so the
    /// email can be registered again.
    async fn discard_account(&self, id: AccountId) {
        match self.store.delete_account(id).await {
            Ok(_) => warn!(account_id = %id, "Registration rolled back"),
            Err(e) => error!(
                account_id = %id,
                error = %e,
                "Failed to roll back registration; account exists without a session"
            ),
        }
    }

    async fn do_register(&self, input: NewAccount) -> Result<AuthResult, AuthError> {
        self.validate_registration(&input)?;

        let password_hash = self.credentials.hash_password(&input.password).await?;
        let avatar_id = self.default_avatar().await?;

        let account = match self
            .store
            .create_account(&input, &password_hash, avatar_id)
            .await?
        {
            CreateAccount::Created(account) => account.sanitized(),
            CreateAccount::DuplicateEmail => {
                return Err(AuthError::Conflict(DUPLICATE_EMAIL.to_string()));
            }
        };

        let opened = async {
            let tokens = self.credentials.issue_token_pair(&account)?;
            let session = self
                .sessions
                .create(
                    account.id,
                    self.credentials.auth_config().session_ttl(),
                    Some(&tokens.refresh_token),
                )
                .await?;
            Ok::<_, AuthError>((tokens, session))
        }
        .await;

        let (tokens, session) = match opened {
            Ok(opened) => opened,
            Err(e) => {
                self.discard_account(account.id).await;
                return Err(e);
            }
        };

        info!(account_id = %account.id, "Account registered");

        Ok(AuthResult {
            account,
            tokens,
            session_token: session.token,
            session_expires_at: session.expires_at,
        })
    }

    async fn do_login(&self, email: &str, password: &str) -> Result<AuthResult, AuthError> {
        if email.trim().is_empty() || password.is_empty() {
            return Err(AuthError::Validation(
                "Email and password are required".to_string(),
            ));
        }

        let Some(found) = self.store.get_account_by_email(email).await? else {
            return Err(self.credentials.reject_unknown_account(password).await);
        };

        self.credentials
            .verify_password(&found.password_hash, password)
            .await?;

        let account = self
            .store
            .touch_last_login(found.id)
            .await?
            .ok_or(AuthError::Unauthorized(AuthFailure::AccountNotFound))?
            .sanitized();
        self.cache.invalidate(account.id).await;

        let tokens = self.credentials.issue_token_pair(&account)?;
        let session = self
            .sessions
            .upsert(
                account.id,
                self.credentials.auth_config().session_ttl(),
                Some(&tokens.refresh_token),
            )
            .await?;

        info!(account_id = %account.id, "Login successful");

        Ok(AuthResult {
            account,
            tokens,
            session_token: session.token,
            session_expires_at: session.expires_at,
        })
    }

    async fn do_refresh(&self, refresh_token: &str) -> Result<RefreshResult, AuthError> {
        let account_id = self.credentials.validate_refresh_token(refresh_token)?;

        let session = self
            .sessions
            .find_by_account(account_id)
            .await?
            .ok_or(AuthError::Unauthorized(AuthFailure::SessionNotFound))?;
        if session.is_expired() {
            return Err(AuthError::Unauthorized(AuthFailure::SessionExpired));
        }
        if session.refresh_token.as_deref() != Some(refresh_token) {
            return Err(AuthError::Unauthorized(AuthFailure::InvalidToken));
        }

        let account = match self.cache.resolve(&self.store, account_id).await {
            Ok(account) => account,
            Err(AuthError::NotFound(_)) => {
                return Err(AuthError::Unauthorized(AuthFailure::AccountNotFound));
            }
            Err(e) => return Err(e),
        };

        let ttl = self.credentials.auth_config().access_token_ttl();
        let access_token = self
            .credentials
            .issue_token(&account, TokenKind::Access, ttl)?;

        Ok(RefreshResult {
            access_token,
            token_type: "Bearer",
            expires_in: ttl.as_secs(),
        })
    }
}

#[async_trait]
impl AuthService for SeaOrmAuthService {
    async fn register(&self, input: NewAccount) -> Result<AuthResult, AuthError> {
        let result = self.do_register(input).await;
        record("register", &result);
        result
    }

    async fn login(&self, email: &str, password: &str) -> Result<AuthResult, AuthError> {
        let result = self.do_login(email, password).await;
        if let Err(AuthError::Unauthorized(reason)) = &result {
            info!(email = %normalize_email(email), reason = reason.as_str(), "Login rejected");
        }
        record("login", &result);
        result
    }

    async fn logout(&self, session_token: &str) -> Result<(), AuthError> {
        let result = self.sessions.delete_by_token(session_token).await;
        record("logout", &result);
        result
    }

    async fn refresh(&self, refresh_token: &str) -> Result<RefreshResult, AuthError> {
        let result = self.do_refresh(refresh_token).await;
        record("refresh", &result);
        result
    }

    async fn get_principal(&self, token: &str) -> Result<Principal, AuthError> {
        self.bearer.resolve(token).await
    }

    async fn upload_avatar(
        &self,
        account_id: AccountId,
        input: UploadInput,
    ) -> Result<Account, AuthError> {
        let result = self.avatars.upload_avatar(account_id, input).await;
        record("upload_avatar", &result);
        result
    }

    async fn get_avatar_url(
        &self,
        avatar_id: AvatarId,
        ttl: Option<Duration>,
    ) -> Result<Url, AuthError> {
        self.avatars.get_avatar_url(avatar_id, ttl).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Account, AuthError> {
        self.store
            .get_account_by_email(email)
            .await?
            .map(Account::sanitized)
            .ok_or_else(|| AuthError::NotFound("Account not found".to_string()))
    }

    async fn get_by_id(&self, id: AccountId) -> Result<Account, AuthError> {
        self.cache.resolve(&self.store, id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::cache::MemoryCache;
    use crate::clients::object_storage::test_support::memory_storage;
    use crate::db::test_support::memory_store;
    use crate::services::credentials::test_support::fast_security;
    use crate::services::identity_cache::CacheLookup;
    use bytes::Bytes;
    use sea_orm::ConnectionTrait;

    struct Fixture {
        service: SeaOrmAuthService,
        store: Store,
        cache: IdentityCache,
        storage: Arc<dyn ObjectStorage>,
    }

    async fn fixture_with(config: Config) -> Fixture {
        let store = memory_store().await;
        let storage: Arc<dyn ObjectStorage> = Arc::new(memory_storage());
        let cache = IdentityCache::new(
            Arc::new(MemoryCache::new()),
            "test",
            Duration::from_secs(60),
        );
        let credentials = Arc::new(CredentialService::new(
            config.auth.clone(),
            config.security.clone(),
        ));
        let service = SeaOrmAuthService::new(
            store.clone(),
            credentials,
            cache.clone(),
            storage.clone(),
            &config,
        );

        Fixture {
            service,
            store,
            cache,
            storage,
        }
    }

    async fn fixture() -> Fixture {
        fixture_with(Config {
            security: fast_security(),
            ..Config::default()
        })
        .await
    }

    fn registration(email: &str, password: &str) -> NewAccount {
        NewAccount {
            email: email.to_string(),
            password: password.to_string(),
            ..NewAccount::default()
        }
    }

    #[tokio::test]
    async fn register_login_and_lookup() {
        let f = fixture().await;
        let registered = f
            .service
            .register(registration("a@x.com", "secret1"))
            .await
            .unwrap();
        assert_eq!(registered.account.role, "user");
        assert!(registered.account.password_hash.is_empty());
        assert_eq!(registered.session_token.len(), 64);

        let stored = f.store.get_account(registered.account.id).await.unwrap().unwrap();
        assert_ne!(stored.password_hash, "secret1");
        assert!(stored.password_hash.starts_with("$argon2id$"));

        let login = f.service.login("A@X.com", "secret1").await.unwrap();
        assert_eq!(login.account.id, registered.account.id);
        assert!(login.account.last_login_at.is_some());
        assert!(login.session_expires_at > chrono::Utc::now());
        let principal = f
            .service
            .get_principal(&login.tokens.access_token)
            .await
            .unwrap();
        assert_eq!(principal.account_id(), registered.account.id);

        assert!(matches!(
            f.service.login("a@x.com", "wrong-password").await,
            Err(AuthError::Unauthorized(AuthFailure::WrongCredentials))
        ));

        let fetched = f.service.get_by_id(registered.account.id).await.unwrap();
        assert!(fetched.password_hash.is_empty());
        assert_eq!(fetched.email, "a@x.com");
    }

    #[tokio::test]
    async fn login_invalidates_cached_identity() {
        let f = fixture().await;
        let id = f
            .service
            .register(registration("a@x.com", "secret1"))
            .await
            .unwrap()
            .account
            .id;

        f.service.get_by_id(id).await.unwrap();
        assert!(matches!(f.cache.get(id).await, CacheLookup::Hit(_)));

        f.service.login("a@x.com", "secret1").await.unwrap();
        assert_eq!(f.cache.get(id).await, CacheLookup::Miss);

        let fetched = f.service.get_by_id(id).await.unwrap();
        assert!(fetched.last_login_at.is_some());
    }

    #[tokio::test]
    async fn failed_session_open_rolls_back_registration() {
        let f = fixture().await;
        f.store
            .conn
            .execute_unprepared(
                "CREATE TRIGGER reject_sessions BEFORE INSERT ON sessions \
                 BEGIN SELECT RAISE(ABORT, 'sessions unavailable'); END;",
            )
            .await
            .unwrap();

        let err = f
            .service
            .register(registration("a@x.com", "secret1"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Infrastructure(_)));
        assert!(f.store.get_account_by_email("a@x.com").await.unwrap().is_none());

        f.store
            .conn
            .execute_unprepared("DROP TRIGGER reject_sessions")
            .await
            .unwrap();
        f.service
            .register(registration("a@x.com", "secret1"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn unknown_email_looks_like_wrong_password() {
        let f = fixture().await;
        assert!(matches!(
            f.service.login("nobody@x.com", "secret1").await,
            Err(AuthError::Unauthorized(AuthFailure::WrongCredentials))
        ));
    }

    #[tokio::test]
    async fn duplicate_email_conflicts_and_writes_nothing() {
        let f = fixture().await;
        let first = f
            .service
            .register(registration("a@x.com", "secret1"))
            .await
            .unwrap();

        let err = f
            .service
            .register(registration(" A@X.COM ", "other-secret"))
            .await
            .unwrap_err();
        assert!(matches!(&err, AuthError::Conflict(msg) if msg == DUPLICATE_EMAIL));

        let stored = f.service.find_by_email("a@x.com").await.unwrap();
        assert_eq!(stored.id, first.account.id);
        f.service.login("a@x.com", "secret1").await.unwrap();
    }

    #[tokio::test]
    async fn registration_input_is_validated() {
        let f = fixture().await;
        for (email, password) in [("", "secret1"), ("no-at-sign", "secret1"), ("a@x.com", "abc")] {
            assert!(matches!(
                f.service.register(registration(email, password)).await,
                Err(AuthError::Validation(_))
            ));
        }
    }

    #[tokio::test]
    async fn login_rotates_session() {
        let f = fixture().await;
        let registered = f
            .service
            .register(registration("a@x.com", "secret1"))
            .await
            .unwrap();
        let login = f.service.login("a@x.com", "secret1").await.unwrap();

        assert_ne!(registered.session_token, login.session_token);
        let sessions = SessionRegistry::new(f.store.clone());
        assert!(sessions.get_by_token(&registered.session_token).await.is_err());
        assert_eq!(
            sessions
                .get_by_token(&login.session_token)
                .await
                .unwrap()
                .account_id,
            registered.account.id
        );
    }

    #[tokio::test]
    async fn logout_is_idempotent() {
        let f = fixture().await;
        let registered = f
            .service
            .register(registration("a@x.com", "secret1"))
            .await
            .unwrap();

        f.service.logout(&registered.session_token).await.unwrap();
        f.service.logout(&registered.session_token).await.unwrap();
        f.service.logout("").await.unwrap();
    }

    #[tokio::test]
    async fn refresh_requires_live_bound_session() {
        let f = fixture().await;
        f.service
            .register(registration("a@x.com", "secret1"))
            .await
            .unwrap();
        let login = f.service.login("a@x.com", "secret1").await.unwrap();

        let refreshed = f.service.refresh(&login.tokens.refresh_token).await.unwrap();
        assert!(f.service.get_principal(&refreshed.access_token).await.is_ok());

        assert!(matches!(
            f.service.refresh(&login.tokens.access_token).await,
            Err(AuthError::Unauthorized(AuthFailure::InvalidToken))
        ));

        let relogin = f.service.login("a@x.com", "secret1").await.unwrap();
        assert!(matches!(
            f.service.refresh(&login.tokens.refresh_token).await,
            Err(AuthError::Unauthorized(AuthFailure::InvalidToken))
        ));

        f.service.logout(&relogin.session_token).await.unwrap();
        assert!(matches!(
            f.service.refresh(&relogin.tokens.refresh_token).await,
            Err(AuthError::Unauthorized(AuthFailure::SessionNotFound))
        ));
    }

    #[tokio::test]
    async fn avatar_upload_then_presigned_url() {
        let f = fixture().await;
        let registered = f
            .service
            .register(registration("a@x.com", "secret1"))
            .await
            .unwrap();

        let png = b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDR";
        let updated = f
            .service
            .upload_avatar(
                registered.account.id,
                UploadInput {
                    content: Bytes::from_static(png),
                    name: "face.png".to_string(),
                    size: png.len(),
                    declared_content_type: Some("application/octet-stream".to_string()),
                    bucket: "avatars".to_string(),
                },
            )
            .await
            .unwrap();
        let avatar_id = updated.avatar_id.unwrap();

        let fetched = f.service.get_by_id(registered.account.id).await.unwrap();
        assert_eq!(fetched.avatar_id, Some(avatar_id));

        let url = f.service.get_avatar_url(avatar_id, None).await.unwrap();
        let avatar = f.store.get_avatar(avatar_id).await.unwrap().unwrap();
        assert!(url.path().contains("/avatars/"));
        assert!(url.path().ends_with(&avatar.file_path));

        let expires: i64 = url
            .query_pairs()
            .find(|(k, _)| k == "expires")
            .map(|(_, v)| v.parse().unwrap())
            .unwrap();
        assert!(expires <= chrono::Utc::now().timestamp() + 7 * 24 * 3600);

        let object = f
            .storage
            .get_object(&avatar.bucket, &avatar.file_path)
            .await
            .unwrap();
        assert_eq!(object.content.as_ref(), png);
    }

    #[tokio::test]
    async fn default_avatar_is_linked_when_present() {
        let mut config = Config {
            security: fast_security(),
            ..Config::default()
        };
        config.storage.default_avatar_path = Some("default.png".to_string());
        let f = fixture_with(config).await;

        let without = f
            .service
            .register(registration("first@x.com", "secret1"))
            .await
            .unwrap();
        assert_eq!(without.account.avatar_id, None);

        let seeded = f
            .store
            .attach_new_avatar(without.account.id, "avatars", "default.png")
            .await
            .unwrap()
            .unwrap();

        let with = f
            .service
            .register(registration("second@x.com", "secret1"))
            .await
            .unwrap();
        assert_eq!(with.account.avatar_id, seeded.avatar_id);
    }
}
