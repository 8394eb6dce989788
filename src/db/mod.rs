use anyhow::Result;
use chrono::{DateTime, Utc};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::config::DatabaseConfig;
use crate::domain::{AccountId, AvatarId};
use crate::models::{Account, Avatar, NewAccount, Session};

pub mod migrator;
pub mod repositories;

pub use repositories::account::CreateAccount;
pub use repositories::session::CreateSession;

/// Durable directory of accounts, avatars and sessions.
#[derive(Clone)]
pub struct Store {
    pub conn: DatabaseConnection,
}

impl Store {
    pub async fn from_config(config: &DatabaseConfig) -> Result<Self> {
        Self::with_pool_options(
            &config.url,
            config.max_connections,
            config.min_connections,
            Duration::from_secs(config.acquire_timeout_seconds),
        )
        .await
    }

    pub async fn with_pool_options(
        db_url: &str,
        max_connections: u32,
        min_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self> {
        use sea_orm_migration::MigratorTrait;

        if db_url.starts_with("sqlite:") && !db_url.contains(":memory:") {
            let path_str = db_url.trim_start_matches("sqlite:");
            if let Some(parent) = Path::new(path_str).parent() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
            if !Path::new(path_str).exists() {
                std::fs::File::create(path_str)?;
            }
        }

        let mut opt = ConnectOptions::new(db_url.to_string());
        opt.max_connections(max_connections)
            .min_connections(min_connections)
            .connect_timeout(Duration::from_secs(10))
            .acquire_timeout(acquire_timeout)
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(600))
            .sqlx_logging(false);

        let conn = Database::connect(opt).await?;

        migrator::Migrator::up(&conn, None).await?;

        info!(
            "Database connected & migrations applied (pool: {}-{})",
            min_connections, max_connections
        );

        Ok(Self { conn })
    }

    pub async fn ping(&self) -> Result<()> {
        let backend = self.conn.get_database_backend();
        self.conn
            .query_one(Statement::from_string(backend, "SELECT 1".to_string()))
            .await?;
        Ok(())
    }

    fn account_repo(&self) -> repositories::account::AccountRepository {
        repositories::account::AccountRepository::new(self.conn.clone())
    }

    fn avatar_repo(&self) -> repositories::avatar::AvatarRepository {
        repositories::avatar::AvatarRepository::new(self.conn.clone())
    }

    fn session_repo(&self) -> repositories::session::SessionRepository {
        repositories::session::SessionRepository::new(self.conn.clone())
    }

    pub async fn create_account(
        &self,
        input: &NewAccount,
        password_hash: &str,
        avatar_id: Option<AvatarId>,
    ) -> Result<CreateAccount> {
        self.account_repo()
            .create(input, password_hash, avatar_id)
            .await
    }

    pub async fn get_account_by_email(&self, email: &str) -> Result<Option<Account>> {
        self.account_repo().get_by_email(email).await
    }

    pub async fn get_account(&self, id: AccountId) -> Result<Option<Account>> {
        self.account_repo().get_by_id(id).await
    }

    pub async fn touch_last_login(&self, id: AccountId) -> Result<Option<Account>> {
        self.account_repo().touch_last_login(id).await
    }

    pub async fn delete_account(&self, id: AccountId) -> Result<u64> {
        self.account_repo().delete(id).await
    }

    pub async fn attach_new_avatar(
        &self,
        id: AccountId,
        bucket: &str,
        file_path: &str,
    ) -> Result<Option<Account>> {
        self.account_repo()
            .attach_new_avatar(id, bucket, file_path)
            .await
    }

    pub async fn get_avatar(&self, id: AvatarId) -> Result<Option<Avatar>> {
        self.avatar_repo().get_by_id(id).await
    }

    pub async fn get_avatar_by_file_path(&self, file_path: &str) -> Result<Option<Avatar>> {
        self.avatar_repo().get_by_file_path(file_path).await
    }

    pub async fn insert_session(
        &self,
        account_id: AccountId,
        token: &str,
        refresh_token: Option<&str>,
        expires_at: DateTime<Utc>,
    ) -> Result<CreateSession> {
        self.session_repo()
            .insert(account_id, token, refresh_token, expires_at)
            .await
    }

    pub async fn upsert_session(
        &self,
        account_id: AccountId,
        token: &str,
        refresh_token: Option<&str>,
        expires_at: DateTime<Utc>,
    ) -> Result<Session> {
        self.session_repo()
            .upsert(account_id, token, refresh_token, expires_at)
            .await
    }

    pub async fn get_session_by_token(&self, token: &str) -> Result<Option<Session>> {
        self.session_repo().get_by_token(token).await
    }

    pub async fn get_session_by_account(&self, account_id: AccountId) -> Result<Option<Session>> {
        self.session_repo().get_by_account(account_id).await
    }

    pub async fn delete_session_by_token(&self, token: &str) -> Result<u64> {
        self.session_repo().delete_by_token(token).await
    }
}
