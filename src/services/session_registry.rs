//! Server-held opaque sessions, one per account.

use chrono::Utc;
use std::time::Duration;
use tracing::debug;

use crate::db::{CreateSession, Store};
use crate::domain::AccountId;
use crate::models::Session;
use crate::services::auth_service::{AuthError, AuthFailure};
use crate::services::credentials::generate_opaque_token;

#[derive(Clone)]
pub struct SessionRegistry {
    store: Store,
}

fn expiry_after(ttl: Duration) -> Result<chrono::DateTime<Utc>, AuthError> {
    chrono::Duration::from_std(ttl)
        .map(|ttl| Utc::now() + ttl)
        .map_err(|e| AuthError::Infrastructure(format!("Session lifetime out of range: {e}")))
}

impl SessionRegistry {
    #[must_use]
    pub const fn new(store: Store) -> Self {
        Self { store }
    }

    /// Opens the first session of an account.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Conflict`] if the account already holds one.
    pub async fn create(
        &self,
        account_id: AccountId,
        ttl: Duration,
        refresh_token: Option<&str>,
    ) -> Result<Session, AuthError> {
        let token = generate_opaque_token();
        let expires_at = expiry_after(ttl)?;

        match self
            .store
            .insert_session(account_id, &token, refresh_token, expires_at)
            .await?
        {
            CreateSession::Created(session) => {
                debug!(account_id = %account_id, "Session created");
                Ok(session)
            }
            CreateSession::AlreadyExists => Err(AuthError::Conflict(
                "Account already has an active session".to_string(),
            )),
        }
    }

    /// Opens or replaces the account's session. The previous token stops resolving.
    pub async fn upsert(
        &self,
        account_id: AccountId,
        ttl: Duration,
        refresh_token: Option<&str>,
    ) -> Result<Session, AuthError> {
        let token = generate_opaque_token();
        let expires_at = expiry_after(ttl)?;

        let session = self
            .store
            .upsert_session(account_id, &token, refresh_token, expires_at)
            .await?;
        debug!(account_id = %account_id, "Session rotated");
        Ok(session)
    }

    /// Looks a session up by its opaque token. Expiry is left to the caller.
    pub async fn get_by_token(&self, token: &str) -> Result<Session, AuthError> {
        if token.is_empty() {
            return Err(AuthError::Unauthorized(AuthFailure::SessionNotFound));
        }

        self.store
            .get_session_by_token(token)
            .await?
            .ok_or(AuthError::Unauthorized(AuthFailure::SessionNotFound))
    }

    /// Removes the session if present. Removing an absent session succeeds.
    pub async fn delete_by_token(&self, token: &str) -> Result<(), AuthError> {
        if token.is_empty() {
            return Ok(());
        }

        let removed = self.store.delete_session_by_token(token).await?;
        debug!(removed, "Session deleted");
        Ok(())
    }

    pub async fn find_by_account(&self, account_id: AccountId) -> Result<Option<Session>, AuthError> {
        Ok(self.store.get_session_by_account(account_id).await?)
    }
}
