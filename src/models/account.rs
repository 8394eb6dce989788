use serde::{Deserialize, Serialize};

use crate::domain::{AccountId, AvatarId};
use crate::entities::accounts;

/// An account as it crosses the service boundary.
///
/// `password_hash` is skipped by serde in both directions: responses and cache
/// entries never carry it, and anything read back from the cache comes out
/// with an empty hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub email: String,
    #[serde(skip, default)]
    pub password_hash: String,
    pub role: String,
    #[serde(flatten)]
    pub profile: Profile,
    pub avatar_id: Option<AvatarId>,
    pub created_at: String,
    pub updated_at: String,
    pub last_login_at: Option<String>,
}

impl Account {
    /// Drops the password hash. Call before the account leaves the service layer.
    pub fn sanitize_password(&mut self) {
        self.password_hash.clear();
    }

    #[must_use]
    pub fn sanitized(mut self) -> Self {
        self.sanitize_password();
        self
    }
}

/// Optional profile fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub about: Option<String>,
    pub phone_number: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub gender: Option<String>,
    pub postcode: Option<String>,
    pub birthday: Option<String>,
}

/// Registration input.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewAccount {
    pub email: String,
    pub password: String,
    pub role: Option<String>,
    #[serde(flatten)]
    pub profile: Profile,
}

impl TryFrom<accounts::Model> for Account {
    type Error = uuid::Error;

    fn try_from(model: accounts::Model) -> Result<Self, Self::Error> {
        let avatar_id = model
            .avatar_id
            .as_deref()
            .map(str::parse::<AvatarId>)
            .transpose()?;

        Ok(Self {
            id: model.id.parse()?,
            email: model.email,
            password_hash: model.password_hash,
            role: model.role,
            profile: Profile {
                first_name: model.first_name,
                last_name: model.last_name,
                about: model.about,
                phone_number: model.phone_number,
                address: model.address,
                city: model.city,
                gender: model.gender,
                postcode: model.postcode,
                birthday: model.birthday,
            },
            avatar_id,
            created_at: model.created_at,
            updated_at: model.updated_at,
            last_login_at: model.last_login_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Account {
        Account {
            id: AccountId::generate(),
            email: "a@x.com".to_string(),
            password_hash: "$argon2id$v=19$m=8,t=1,p=1$c2FsdA$aGFzaA".to_string(),
            role: "user".to_string(),
            profile: Profile {
                first_name: Some("Ada".to_string()),
                ..Profile::default()
            },
            avatar_id: None,
            created_at: "2026-01-01T00:00:00+00:00".to_string(),
            updated_at: "2026-01-01T00:00:00+00:00".to_string(),
            last_login_at: None,
        }
    }

    #[test]
    fn serialized_account_never_contains_hash() {
        let account = sample();
        let json = serde_json::to_string(&account).unwrap();
        assert!(!json.contains("argon2"));
        assert!(!json.contains("password"));
        assert!(json.contains("\"first_name\":\"Ada\""));
    }

    #[test]
    fn sanitize_clears_hash() {
        let account = sample().sanitized();
        assert!(account.password_hash.is_empty());
    }

    #[test]
    fn deserialized_account_has_empty_hash() {
        let json = serde_json::to_string(&sample()).unwrap();
        let back: Account = serde_json::from_str(&json).unwrap();
        assert!(back.password_hash.is_empty());
        assert_eq!(back.profile.first_name.as_deref(), Some("Ada"));
    }
}
