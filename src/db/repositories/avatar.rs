use anyhow::{Context, Result};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder};

use crate::domain::AvatarId;
use crate::entities::avatars;
use crate::models::Avatar;

pub struct AvatarRepository {
    conn: DatabaseConnection,
}

impl AvatarRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn get_by_id(&self, id: AvatarId) -> Result<Option<Avatar>> {
        let avatar = avatars::Entity::find_by_id(id.to_string())
            .one(&self.conn)
            .await
            .context("Failed to query avatar by ID")?;

        avatar
            .map(|m| Avatar::try_from(m).context("Corrupt identifier in avatars row"))
            .transpose()
    }

    /// Oldest avatar stored under `file_path`, if any
    pub async fn get_by_file_path(&self, file_path: &str) -> Result<Option<Avatar>> {
        let avatar = avatars::Entity::find()
            .filter(avatars::Column::FilePath.eq(file_path))
            .order_by_asc(avatars::Column::CreatedAt)
            .one(&self.conn)
            .await
            .context("Failed to query avatar by file path")?;

        avatar
            .map(|m| Avatar::try_from(m).context("Corrupt identifier in avatars row"))
            .transpose()
    }
}
