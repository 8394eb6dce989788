use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set, SqlErr,
};

use crate::domain::{AccountId, SessionId};
use crate::entities::sessions;
use crate::models::Session;

/// Outcome of a plain session insert.
#[derive(Debug)]
pub enum CreateSession {
    Created(Session),
    /// The account already holds a session row.
    AlreadyExists,
}

fn to_session(model: sessions::Model) -> Result<Session> {
    Session::try_from(model).context("Corrupt sessions row")
}

pub struct SessionRepository {
    conn: DatabaseConnection,
}

impl SessionRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn insert(
        &self,
        account_id: AccountId,
        token: &str,
        refresh_token: Option<&str>,
        expires_at: DateTime<Utc>,
    ) -> Result<CreateSession> {
        let now = Utc::now().to_rfc3339();

        let active = sessions::ActiveModel {
            id: Set(SessionId::generate().to_string()),
            token: Set(token.to_string()),
            account_id: Set(account_id.to_string()),
            refresh_token: Set(refresh_token.map(ToString::to_string)),
            expires_at: Set(expires_at.to_rfc3339()),
            created_at: Set(now.clone()),
            updated_at: Set(now),
        };

        match active.insert(&self.conn).await {
            Ok(model) => Ok(CreateSession::Created(to_session(model)?)),
            Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                Ok(CreateSession::AlreadyExists)
            }
            Err(e) => Err(e).context("Failed to insert session"),
        }
    }

    /// Insert, or replace token/expiry of the account's existing row, in one statement.
    pub async fn upsert(
        &self,
        account_id: AccountId,
        token: &str,
        refresh_token: Option<&str>,
        expires_at: DateTime<Utc>,
    ) -> Result<Session> {
        let now = Utc::now().to_rfc3339();

        let active = sessions::ActiveModel {
            id: Set(SessionId::generate().to_string()),
            token: Set(token.to_string()),
            account_id: Set(account_id.to_string()),
            refresh_token: Set(refresh_token.map(ToString::to_string)),
            expires_at: Set(expires_at.to_rfc3339()),
            created_at: Set(now.clone()),
            updated_at: Set(now),
        };

        sessions::Entity::insert(active)
            .on_conflict(
                OnConflict::column(sessions::Column::AccountId)
                    .update_columns([
                        sessions::Column::Token,
                        sessions::Column::RefreshToken,
                        sessions::Column::ExpiresAt,
                        sessions::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&self.conn)
            .await
            .context("Failed to upsert session")?;

        self.get_by_account(account_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Session vanished after upsert for {account_id}"))
    }

    pub async fn get_by_token(&self, token: &str) -> Result<Option<Session>> {
        let session = sessions::Entity::find()
            .filter(sessions::Column::Token.eq(token))
            .one(&self.conn)
            .await
            .context("Failed to query session by token")?;

        session.map(to_session).transpose()
    }

    pub async fn get_by_account(&self, account_id: AccountId) -> Result<Option<Session>> {
        let session = sessions::Entity::find()
            .filter(sessions::Column::AccountId.eq(account_id.to_string()))
            .one(&self.conn)
            .await
            .context("Failed to query session by account")?;

        session.map(to_session).transpose()
    }

    /// Returns the number of rows removed (0 or 1).
    pub async fn delete_by_token(&self, token: &str) -> Result<u64> {
        let result = sessions::Entity::delete_many()
            .filter(sessions::Column::Token.eq(token))
            .exec(&self.conn)
            .await
            .context("Failed to delete session")?;

        Ok(result.rows_affected)
    }
}
