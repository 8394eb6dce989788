use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "accounts")]
pub struct Model {
    /// UUID rendered as text
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// Trimmed, lower-cased email
    #[sea_orm(unique)]
    pub email: String,

    /// Argon2id password hash
    pub password_hash: String,

    pub role: String,

    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub about: Option<String>,
    pub phone_number: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub gender: Option<String>,
    pub postcode: Option<String>,
    pub birthday: Option<String>,

    pub avatar_id: Option<String>,

    pub created_at: String,

    pub updated_at: String,

    pub last_login_at: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::avatars::Entity",
        from = "Column::AvatarId",
        to = "super::avatars::Column::Id",
        on_update = "NoAction",
        on_delete = "SetNull"
    )]
    Avatars,
    #[sea_orm(has_one = "super::sessions::Entity")]
    Sessions,
}

impl Related<super::avatars::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Avatars.def()
    }
}

impl Related<super::sessions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Sessions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
