use anyhow::{Context, Result};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set, SqlErr,
    TransactionTrait,
};

use crate::domain::{AccountId, AvatarId, normalize_email, role_or_default};
use crate::entities::{accounts, avatars, sessions};
use crate::models::{Account, NewAccount};

/// Outcome of an account insert.
#[derive(Debug)]
pub enum CreateAccount {
    Created(Account),
    /// The unique email index rejected the row.
    DuplicateEmail,
}

fn to_account(model: accounts::Model) -> Result<Account> {
    Account::try_from(model).context("Corrupt identifier in accounts row")
}

pub struct AccountRepository {
    conn: DatabaseConnection,
}

impl AccountRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Insert a new account. `password_hash` must already be hashed.
    pub async fn create(
        &self,
        input: &NewAccount,
        password_hash: &str,
        avatar_id: Option<AvatarId>,
    ) -> Result<CreateAccount> {
        let now = chrono::Utc::now().to_rfc3339();
        let profile = input.profile.clone();

        let active = accounts::ActiveModel {
            id: Set(AccountId::generate().to_string()),
            email: Set(normalize_email(&input.email)),
            password_hash: Set(password_hash.to_string()),
            role: Set(role_or_default(input.role.as_deref())),
            first_name: Set(profile.first_name),
            last_name: Set(profile.last_name),
            about: Set(profile.about),
            phone_number: Set(profile.phone_number),
            address: Set(profile.address),
            city: Set(profile.city),
            gender: Set(profile.gender),
            postcode: Set(profile.postcode),
            birthday: Set(profile.birthday),
            avatar_id: Set(avatar_id.map(|id| id.to_string())),
            created_at: Set(now.clone()),
            updated_at: Set(now),
            last_login_at: Set(None),
        };

        match active.insert(&self.conn).await {
            Ok(model) => Ok(CreateAccount::Created(to_account(model)?)),
            Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                Ok(CreateAccount::DuplicateEmail)
            }
            Err(e) => Err(e).context("Failed to insert account"),
        }
    }

    /// Get account by email (case-insensitive), hash included
    pub async fn get_by_email(&self, email: &str) -> Result<Option<Account>> {
        let account = accounts::Entity::find()
            .filter(accounts::Column::Email.eq(normalize_email(email)))
            .one(&self.conn)
            .await
            .context("Failed to query account by email")?;

        account.map(to_account).transpose()
    }

    /// Get account by ID, hash included
    pub async fn get_by_id(&self, id: AccountId) -> Result<Option<Account>> {
        let account = accounts::Entity::find_by_id(id.to_string())
            .one(&self.conn)
            .await
            .context("Failed to query account by ID")?;

        account.map(to_account).transpose()
    }

    pub async fn touch_last_login(&self, id: AccountId) -> Result<Option<Account>> {
        let Some(model) = accounts::Entity::find_by_id(id.to_string())
            .one(&self.conn)
            .await
            .context("Failed to query account for login stamp")?
        else {
            return Ok(None);
        };

        let now = chrono::Utc::now().to_rfc3339();
        let mut active: accounts::ActiveModel = model.into();
        active.last_login_at = Set(Some(now));
        let updated = active
            .update(&self.conn)
            .await
            .context("Failed to stamp last login")?;

        to_account(updated).map(Some)
    }

    /// Remove an account row. Its session row goes with it.
    pub async fn delete(&self, id: AccountId) -> Result<u64> {
        sessions::Entity::delete_many()
            .filter(sessions::Column::AccountId.eq(id.to_string()))
            .exec(&self.conn)
            .await
            .context("Failed to delete sessions of account")?;

        let result = accounts::Entity::delete_by_id(id.to_string())
            .exec(&self.conn)
            .await
            .context("Failed to delete account")?;

        Ok(result.rows_affected)
    }

    /// Insert an avatar row and point the account at it, atomically.
    ///
    /// Returns `None` (and writes nothing) if the account does not exist.
    pub async fn attach_new_avatar(
        &self,
        id: AccountId,
        bucket: &str,
        file_path: &str,
    ) -> Result<Option<Account>> {
        let txn = self
            .conn
            .begin()
            .await
            .context("Failed to open avatar transaction")?;

        let Some(model) = accounts::Entity::find_by_id(id.to_string())
            .one(&txn)
            .await
            .context("Failed to query account for avatar update")?
        else {
            txn.rollback().await.ok();
            return Ok(None);
        };

        let now = chrono::Utc::now().to_rfc3339();
        let avatar = avatars::ActiveModel {
            id: Set(AvatarId::generate().to_string()),
            bucket: Set(bucket.to_string()),
            file_path: Set(file_path.to_string()),
            created_at: Set(now.clone()),
            updated_at: Set(now.clone()),
        }
        .insert(&txn)
        .await
        .context("Failed to insert avatar")?;

        let mut active: accounts::ActiveModel = model.into();
        active.avatar_id = Set(Some(avatar.id));
        active.updated_at = Set(now);
        let updated = active
            .update(&txn)
            .await
            .context("Failed to link avatar to account")?;

        txn.commit()
            .await
            .context("Failed to commit avatar transaction")?;

        to_account(updated).map(Some)
    }
}
