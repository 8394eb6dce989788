use super::ApiError;
use crate::domain::{AccountId, AvatarId};

pub fn parse_account_id(raw: &str) -> Result<AccountId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::validation(format!("Invalid account ID: {raw}")))
}

pub fn parse_avatar_id(raw: &str) -> Result<AvatarId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::validation(format!("Invalid avatar ID: {raw}")))
}

pub fn validate_email_query(email: Option<&str>) -> Result<&str, ApiError> {
    match email.map(str::trim) {
        Some(e) if !e.is_empty() => Ok(e),
        _ => Err(ApiError::validation("Query parameter 'email' is required")),
    }
}

/// Bucket names: 3-63 chars of lowercase letters, digits, `-` and `.`.
pub fn validate_bucket_name(bucket: &str) -> Result<&str, ApiError> {
    let valid_chars = bucket
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.');
    let valid_edges = bucket
        .chars()
        .next()
        .zip(bucket.chars().last())
        .is_some_and(|(first, last)| first.is_ascii_alphanumeric() && last.is_ascii_alphanumeric());

    if !(3..=63).contains(&bucket.len()) || !valid_chars || !valid_edges {
        return Err(ApiError::validation(format!("Invalid bucket name: {bucket}")));
    }

    Ok(bucket)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ids() {
        let id = AccountId::generate();
        assert_eq!(parse_account_id(&id.to_string()).unwrap(), id);
        assert!(parse_account_id("42").is_err());
        assert!(parse_avatar_id("").is_err());
    }

    #[test]
    fn test_validate_email_query() {
        assert_eq!(validate_email_query(Some(" a@x.com ")).unwrap(), "a@x.com");
        assert!(validate_email_query(Some("   ")).is_err());
        assert!(validate_email_query(None).is_err());
    }

    #[test]
    fn test_validate_bucket_name() {
        assert!(validate_bucket_name("avatars").is_ok());
        assert!(validate_bucket_name("team-1.assets").is_ok());
        assert!(validate_bucket_name("ab").is_err());
        assert!(validate_bucket_name("Avatars").is_err());
        assert!(validate_bucket_name("-avatars").is_err());
        assert!(validate_bucket_name("../etc").is_err());
    }
}
