//! Domain service for registration, login and account assets.
//!
//! Handles credentials, server-held sessions, signed tokens and avatars.

use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::domain::{AccountId, AvatarId};
use crate::models::{Account, NewAccount, UploadInput};

/// Why a request was refused. Only ever logged; clients see "Unauthorized".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    WrongCredentials,
    InvalidToken,
    MissingCredentials,
    SessionExpired,
    SessionNotFound,
    AccountNotFound,
}

impl AuthFailure {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::WrongCredentials => "wrong_credentials",
            Self::InvalidToken => "invalid_token",
            Self::MissingCredentials => "missing_credentials",
            Self::SessionExpired => "session_expired",
            Self::SessionNotFound => "session_not_found",
            Self::AccountNotFound => "account_not_found",
        }
    }
}

/// Errors specific to authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Unauthorized")]
    Unauthorized(AuthFailure),

    #[error("{0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Infrastructure error: {0}")]
    Infrastructure(String),
}

impl From<sea_orm::DbErr> for AuthError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Infrastructure(err.to_string())
    }
}

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        Self::Infrastructure(format!("{err:#}"))
    }
}

impl From<crate::clients::object_storage::StorageError> for AuthError {
    fn from(err: crate::clients::object_storage::StorageError) -> Self {
        Self::Infrastructure(err.to_string())
    }
}

/// Signed access and refresh tokens minted from the same account snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    /// Access token lifetime in seconds.
    pub expires_in: u64,
}

/// Result of register or login.
#[derive(Debug, Clone)]
pub struct AuthResult {
    pub account: Account,
    pub tokens: TokenPair,
    /// Opaque session token for the session cookie.
    pub session_token: String,
    pub session_expires_at: chrono::DateTime<chrono::Utc>,
}

/// Result of a token refresh.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshResult {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: u64,
}

/// The authenticated identity attached to a request.
#[derive(Debug, Clone)]
pub struct Principal {
    pub account: Account,
    /// Raw session token when resolved through the session cookie.
    pub session_token: Option<String>,
}

impl Principal {
    #[must_use]
    pub const fn account_id(&self) -> AccountId {
        self.account.id
    }
}

/// Domain service trait for authentication.
#[async_trait::async_trait]
pub trait AuthService: Send + Sync {
    /// Creates an account, its first session and a token pair.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Conflict`] if the email is already registered.
    async fn register(&self, input: NewAccount) -> Result<AuthResult, AuthError>;

    /// Verifies credentials and replaces the account's session.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Unauthorized`] for unknown emails and wrong passwords alike.
    async fn login(&self, email: &str, password: &str) -> Result<AuthResult, AuthError>;

    /// Ends the session behind `session_token`. Absent sessions are not an error.
    async fn logout(&self, session_token: &str) -> Result<(), AuthError>;

    /// Mints a new access token from a refresh token bound to a live session.
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshResult, AuthError>;

    /// Resolves a bearer token to its principal.
    async fn get_principal(&self, token: &str) -> Result<Principal, AuthError>;

    /// Replaces the account's avatar with an uploaded image.
    async fn upload_avatar(
        &self,
        account_id: AccountId,
        input: UploadInput,
    ) -> Result<Account, AuthError>;

    /// Presigned read URL for an avatar. `ttl` is capped at the configured maximum.
    async fn get_avatar_url(
        &self,
        avatar_id: AvatarId,
        ttl: Option<Duration>,
    ) -> Result<Url, AuthError>;

    async fn find_by_email(&self, email: &str) -> Result<Account, AuthError>;

    async fn get_by_id(&self, id: AccountId) -> Result<Account, AuthError>;
}
