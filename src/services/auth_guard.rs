//! Per-request principal resolution.
//!
//! A route is guarded by exactly one [`AuthStrategy`]: a signed bearer token
//! or a server-held session cookie. Both only ever read the durable store.

use async_trait::async_trait;
use axum::http::{HeaderMap, header};
use std::sync::Arc;
use tower_sessions::cookie::Cookie;
use tracing::{debug, error};

use crate::db::Store;
use crate::domain::AccountId;
use crate::services::auth_service::{AuthError, AuthFailure, Principal};
use crate::services::credentials::CredentialService;
use crate::services::identity_cache::IdentityCache;
use crate::services::session_registry::SessionRegistry;

#[async_trait]
pub trait AuthStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Resolves the request's principal. Every failure is `Unauthorized`.
    async fn authenticate(&self, headers: &HeaderMap) -> Result<Principal, AuthError>;
}

/// Value of the named cookie from the request's `Cookie` headers.
#[must_use]
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(Result::ok)
        .find(|cookie| cookie.name() == name)
        .map(|cookie| cookie.value().to_string())
        .filter(|value| !value.is_empty())
}

/// Token from `Authorization: Bearer <token>`.
///
/// A present but malformed header is an error; it does not fall back to the cookie.
fn bearer_header(headers: &HeaderMap) -> Option<Result<String, AuthError>> {
    let value = headers.get(header::AUTHORIZATION)?;

    let parsed = value.to_str().ok().and_then(|raw| {
        let parts: Vec<&str> = raw.split(' ').collect();
        match parts.as_slice() {
            ["Bearer", token] if !token.is_empty() => Some((*token).to_string()),
            _ => None,
        }
    });

    Some(parsed.ok_or(AuthError::Unauthorized(AuthFailure::InvalidToken)))
}

/// Maps account resolution failures onto `Unauthorized`.
async fn resolve_account(
    cache: &IdentityCache,
    store: &Store,
    id: AccountId,
) -> Result<crate::models::Account, AuthError> {
    match cache.resolve(store, id).await {
        Ok(account) => Ok(account),
        Err(AuthError::NotFound(_)) => Err(AuthError::Unauthorized(AuthFailure::AccountNotFound)),
        Err(e) => {
            error!(account_id = %id, error = %e, "Failed to resolve principal account");
            Err(AuthError::Unauthorized(AuthFailure::AccountNotFound))
        }
    }
}

#[derive(Clone)]
pub struct BearerStrategy {
    credentials: Arc<CredentialService>,
    cache: IdentityCache,
    store: Store,
    cookie_name: String,
}

impl BearerStrategy {
    #[must_use]
    pub fn new(
        credentials: Arc<CredentialService>,
        cache: IdentityCache,
        store: Store,
        cookie_name: impl Into<String>,
    ) -> Self {
        Self {
            credentials,
            cache,
            store,
            cookie_name: cookie_name.into(),
        }
    }

    /// Validates a signed access token and loads its account.
    pub async fn resolve(&self, token: &str) -> Result<Principal, AuthError> {
        let account_id = self.credentials.validate_token(token)?;
        let account = resolve_account(&self.cache, &self.store, account_id).await?;

        Ok(Principal {
            account,
            session_token: None,
        })
    }
}

#[async_trait]
impl AuthStrategy for BearerStrategy {
    fn name(&self) -> &'static str {
        "bearer"
    }

    async fn authenticate(&self, headers: &HeaderMap) -> Result<Principal, AuthError> {
        let token = match bearer_header(headers) {
            Some(token) => token?,
            None => cookie_value(headers, &self.cookie_name)
                .ok_or(AuthError::Unauthorized(AuthFailure::MissingCredentials))?,
        };

        self.resolve(&token).await
    }
}

#[derive(Clone)]
pub struct SessionCookieStrategy {
    sessions: SessionRegistry,
    cache: IdentityCache,
    store: Store,
    cookie_name: String,
}

impl SessionCookieStrategy {
    #[must_use]
    pub fn new(
        sessions: SessionRegistry,
        cache: IdentityCache,
        store: Store,
        cookie_name: impl Into<String>,
    ) -> Self {
        Self {
            sessions,
            cache,
            store,
            cookie_name: cookie_name.into(),
        }
    }
}

#[async_trait]
impl AuthStrategy for SessionCookieStrategy {
    fn name(&self) -> &'static str {
        "session"
    }

    async fn authenticate(&self, headers: &HeaderMap) -> Result<Principal, AuthError> {
        let token = cookie_value(headers, &self.cookie_name)
            .ok_or(AuthError::Unauthorized(AuthFailure::MissingCredentials))?;

        let session = match self.sessions.get_by_token(&token).await {
            Ok(session) => session,
            Err(AuthError::Unauthorized(reason)) => return Err(AuthError::Unauthorized(reason)),
            Err(e) => {
                error!(error = %e, "Session lookup failed");
                return Err(AuthError::Unauthorized(AuthFailure::SessionNotFound));
            }
        };

        if session.is_expired() {
            debug!(account_id = %session.account_id, "Rejected expired session");
            return Err(AuthError::Unauthorized(AuthFailure::SessionExpired));
        }

        let account = resolve_account(&self.cache, &self.store, session.account_id).await?;

        Ok(Principal {
            account,
            session_token: Some(token),
        })
    }
}

/// A strategy bound to a route group.
#[derive(Clone)]
pub struct AuthGuard {
    strategy: Arc<dyn AuthStrategy>,
}

impl AuthGuard {
    #[must_use]
    pub fn bearer(strategy: BearerStrategy) -> Self {
        Self {
            strategy: Arc::new(strategy),
        }
    }

    #[must_use]
    pub fn session_cookie(strategy: SessionCookieStrategy) -> Self {
        Self {
            strategy: Arc::new(strategy),
        }
    }

    #[must_use]
    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<Principal, AuthError> {
        self.strategy.authenticate(headers).await
    }
}
