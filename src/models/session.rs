use chrono::{DateTime, Utc};

use crate::domain::{AccountId, SessionId};
use crate::entities::sessions;

/// A server-held session. The `token` is what the client presents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: SessionId,
    pub token: String,
    pub account_id: AccountId,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

impl TryFrom<sessions::Model> for Session {
    type Error = anyhow::Error;

    fn try_from(model: sessions::Model) -> Result<Self, Self::Error> {
        let expires_at = DateTime::parse_from_rfc3339(&model.expires_at)?.with_timezone(&Utc);

        Ok(Self {
            id: model.id.parse()?,
            token: model.token,
            account_id: model.account_id.parse()?,
            refresh_token: model.refresh_token,
            expires_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn expiry_is_inclusive_of_the_deadline() {
        let now = Utc::now();
        let session = Session {
            id: SessionId::generate(),
            token: "t".to_string(),
            account_id: AccountId::generate(),
            refresh_token: None,
            expires_at: now,
        };
        assert!(session.is_expired_at(now));
        assert!(!session.is_expired_at(now - Duration::seconds(1)));
    }
}
