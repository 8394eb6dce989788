use serde::Serialize;

use crate::domain::AvatarId;
use crate::entities::avatars;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Avatar {
    pub id: AvatarId,
    pub bucket: String,
    pub file_path: String,
    pub created_at: String,
    pub updated_at: String,
}

impl TryFrom<avatars::Model> for Avatar {
    type Error = uuid::Error;

    fn try_from(model: avatars::Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: model.id.parse()?,
            bucket: model.bucket,
            file_path: model.file_path,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }
}
