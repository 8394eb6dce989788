//! Password hashing and signed-token issuance.
//!
//! Tokens are compact HS256 JWTs. The signing key and Argon2 cost parameters
//! are injected at construction.

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio::task;
use tracing::{error, warn};

use crate::config::{AuthConfig, SecurityConfig};
use crate::domain::AccountId;
use crate::models::Account;
use crate::services::auth_service::{AuthError, AuthFailure, TokenPair};

const JWT_HEADER: &str = r#"{"alg":"HS256","typ":"JWT"}"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub id: AccountId,
    pub email: String,
    pub role: String,
    pub typ: TokenKind,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

#[derive(Deserialize)]
struct Header {
    alg: String,
}

pub struct CredentialService {
    auth: AuthConfig,
    security: SecurityConfig,
    /// Hash checked against when the email is unknown, so both paths cost one verification.
    decoy_hash: OnceCell<String>,
}

impl CredentialService {
    #[must_use]
    pub const fn new(auth: AuthConfig, security: SecurityConfig) -> Self {
        Self {
            auth,
            security,
            decoy_hash: OnceCell::const_new(),
        }
    }

    #[must_use]
    pub const fn auth_config(&self) -> &AuthConfig {
        &self.auth
    }

    fn argon2(&self) -> Result<Argon2<'static>, AuthError> {
        let params = Params::new(
            self.security.argon2_memory_cost_kib,
            self.security.argon2_time_cost,
            self.security.argon2_parallelism,
            None,
        )
        .map_err(|e| AuthError::Infrastructure(format!("Invalid Argon2 params: {e}")))?;

        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }

    /// Argon2id with a fresh salt, on the blocking pool.
    pub async fn hash_password(&self, plain: &str) -> Result<String, AuthError> {
        if plain.is_empty() {
            return Err(AuthError::Validation("Password is required".to_string()));
        }

        let argon2 = self.argon2()?;
        let password = plain.to_string();

        task::spawn_blocking(move || {
            let salt = SaltString::generate(&mut OsRng);
            argon2
                .hash_password(password.as_bytes(), &salt)
                .map(|hash| hash.to_string())
                .map_err(|e| AuthError::Infrastructure(format!("Failed to hash password: {e}")))
        })
        .await
        .map_err(|e| AuthError::Infrastructure(format!("Password hashing task panicked: {e}")))?
    }

    pub async fn verify_password(&self, hash: &str, plain: &str) -> Result<(), AuthError> {
        let hash = hash.to_string();
        let password = plain.to_string();

        let outcome = task::spawn_blocking(move || {
            let Ok(parsed) = PasswordHash::new(&hash) else {
                return Err(());
            };
            // Verification parameters come from the PHC string itself.
            Ok(Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok())
        })
        .await
        .map_err(|e| AuthError::Infrastructure(format!("Password verification task panicked: {e}")))?;

        match outcome {
            Ok(true) => Ok(()),
            Ok(false) => Err(AuthError::Unauthorized(AuthFailure::WrongCredentials)),
            Err(()) => {
                error!("Stored password hash is malformed");
                Err(AuthError::Unauthorized(AuthFailure::WrongCredentials))
            }
        }
    }

    /// Spends one verification on a throwaway hash. Always fails.
    pub async fn reject_unknown_account(&self, plain: &str) -> AuthError {
        let decoy = self
            .decoy_hash
            .get_or_try_init(|| self.hash_password("gatehouse-decoy-password"))
            .await;

        match decoy {
            Ok(hash) => {
                let _ = self.verify_password(hash, plain).await;
            }
            Err(e) => warn!(error = %e, "Failed to prepare decoy hash"),
        }

        AuthError::Unauthorized(AuthFailure::WrongCredentials)
    }

    fn mac(&self) -> Result<Hmac<Sha256>, AuthError> {
        <Hmac<Sha256>>::new_from_slice(self.auth.jwt_secret.as_bytes())
            .map_err(|e| AuthError::Infrastructure(format!("Invalid signing key: {e}")))
    }

    pub fn issue_token(
        &self,
        account: &Account,
        kind: TokenKind,
        ttl: Duration,
    ) -> Result<String, AuthError> {
        let now = chrono::Utc::now().timestamp();
        let ttl = i64::try_from(ttl.as_secs())
            .map_err(|_| AuthError::Infrastructure("Token lifetime out of range".to_string()))?;

        let claims = Claims {
            id: account.id,
            email: account.email.clone(),
            role: account.role.clone(),
            typ: kind,
            iat: now,
            exp: now + ttl,
            jti: uuid::Uuid::new_v4().to_string(),
        };

        self.sign(&claims)
    }

    fn sign(&self, claims: &Claims) -> Result<String, AuthError> {
        let payload = serde_json::to_vec(claims)
            .map_err(|e| AuthError::Infrastructure(format!("Failed to encode claims: {e}")))?;

        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(JWT_HEADER),
            URL_SAFE_NO_PAD.encode(payload)
        );

        let mut mac = self.mac()?;
        mac.update(signing_input.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        Ok(format!("{signing_input}.{signature}"))
    }

    pub fn issue_token_pair(&self, account: &Account) -> Result<TokenPair, AuthError> {
        let access_ttl = self.auth.access_token_ttl();

        Ok(TokenPair {
            access_token: self.issue_token(account, TokenKind::Access, access_ttl)?,
            refresh_token: self.issue_token(
                account,
                TokenKind::Refresh,
                self.auth.refresh_token_ttl(),
            )?,
            token_type: "Bearer",
            expires_in: access_ttl.as_secs(),
        })
    }

    pub fn validate_token(&self, token: &str) -> Result<AccountId, AuthError> {
        self.decode(token, TokenKind::Access, chrono::Utc::now().timestamp())
            .map(|claims| claims.id)
    }

    pub fn validate_refresh_token(&self, token: &str) -> Result<AccountId, AuthError> {
        self.decode(token, TokenKind::Refresh, chrono::Utc::now().timestamp())
            .map(|claims| claims.id)
    }

    /// Verifies and decodes a token as of `now` (unix seconds).
    pub fn decode(&self, token: &str, expected: TokenKind, now: i64) -> Result<Claims, AuthError> {
        const INVALID: AuthError = AuthError::Unauthorized(AuthFailure::InvalidToken);

        let mut parts = token.split('.');
        let (Some(header_b64), Some(payload_b64), Some(signature_b64), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(INVALID);
        };

        let header: Header = URL_SAFE_NO_PAD
            .decode(header_b64)
            .ok()
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())
            .ok_or(INVALID)?;
        if header.alg != "HS256" {
            return Err(INVALID);
        }

        let signature = URL_SAFE_NO_PAD.decode(signature_b64).map_err(|_| INVALID)?;
        let signed_len = header_b64.len() + 1 + payload_b64.len();
        let mut mac = self.mac()?;
        mac.update(&token.as_bytes()[..signed_len]);
        mac.verify_slice(&signature).map_err(|_| INVALID)?;

        let claims: Claims = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .ok()
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())
            .ok_or(INVALID)?;

        if claims.exp <= now || claims.typ != expected {
            return Err(INVALID);
        }

        Ok(claims)
    }
}

/// Random opaque token (64 character hex string).
#[must_use]
pub fn generate_opaque_token() -> String {
    use rand::Rng;

    let mut rng = rand::rng();
    let bytes: [u8; 32] = rng.random();

    bytes.iter().fold(String::with_capacity(64), |mut acc, b| {
        use std::fmt::Write;
        let _ = write!(acc, "{b:02x}");
        acc
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Cheap Argon2 parameters so tests stay fast.
    pub fn fast_security() -> SecurityConfig {
        SecurityConfig {
            argon2_memory_cost_kib: 256,
            argon2_time_cost: 1,
            argon2_parallelism: 1,
            ..SecurityConfig::default()
        }
    }

    pub fn test_credentials() -> CredentialService {
        let auth = AuthConfig {
            jwt_secret: "test-secret-that-is-long-enough-for-hs256".to_string(),
            ..AuthConfig::default()
        };
        CredentialService::new(auth, fast_security())
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::test_credentials;
    use super::*;
    use crate::models::Profile;

    fn account() -> Account {
        Account {
            id: AccountId::generate(),
            email: "a@x.com".to_string(),
            password_hash: String::new(),
            role: "user".to_string(),
            profile: Profile::default(),
            avatar_id: None,
            created_at: String::new(),
            updated_at: String::new(),
            last_login_at: None,
        }
    }

    #[tokio::test]
    async fn hash_differs_from_plaintext_and_verifies() {
        let creds = test_credentials();
        let hash = creds.hash_password("secret1").await.unwrap();
        assert_ne!(hash, "secret1");
        assert!(hash.starts_with("$argon2id$"));
        creds.verify_password(&hash, "secret1").await.unwrap();
    }

    #[tokio::test]
    async fn wrong_password_is_unauthorized() {
        let creds = test_credentials();
        let hash = creds.hash_password("secret1").await.unwrap();
        let err = creds.verify_password(&hash, "secret2").await.unwrap_err();
        assert!(matches!(
            err,
            AuthError::Unauthorized(AuthFailure::WrongCredentials)
        ));
    }

    #[tokio::test]
    async fn malformed_hash_reads_as_wrong_credentials() {
        let creds = test_credentials();
        let err = creds.verify_password("not-a-phc", "x").await.unwrap_err();
        assert!(matches!(
            err,
            AuthError::Unauthorized(AuthFailure::WrongCredentials)
        ));
    }

    #[tokio::test]
    async fn empty_password_is_rejected() {
        let creds = test_credentials();
        assert!(matches!(
            creds.hash_password("").await,
            Err(AuthError::Validation(_))
        ));
    }

    #[test]
    fn issued_token_validates_to_account() {
        let creds = test_credentials();
        let account = account();
        let token = creds
            .issue_token(&account, TokenKind::Access, Duration::from_secs(60))
            .unwrap();
        assert_eq!(creds.validate_token(&token).unwrap(), account.id);
    }

    #[test]
    fn expired_token_is_rejected() {
        let creds = test_credentials();
        let token = creds
            .issue_token(&account(), TokenKind::Access, Duration::from_secs(60))
            .unwrap();
        let later = chrono::Utc::now().timestamp() + 61;
        assert!(matches!(
            creds.decode(&token, TokenKind::Access, later),
            Err(AuthError::Unauthorized(AuthFailure::InvalidToken))
        ));
    }

    #[test]
    fn tampered_token_is_rejected() {
        let creds = test_credentials();
        let token = creds
            .issue_token(&account(), TokenKind::Access, Duration::from_secs(60))
            .unwrap();

        let mut parts: Vec<&str> = token.split('.').collect();
        let forged = URL_SAFE_NO_PAD.encode(
            br#"{"id":"00000000-0000-0000-0000-000000000000","email":"e","role":"admin","typ":"access","iat":0,"exp":9999999999,"jti":"x"}"#,
        );
        parts[1] = forged.as_str();
        let tampered = parts.join(".");

        assert!(creds.validate_token(&tampered).is_err());
        assert!(creds.validate_token("a.b").is_err());
        assert!(creds.validate_token("").is_err());
    }

    #[test]
    fn token_from_other_key_is_rejected() {
        let other = CredentialService::new(
            AuthConfig {
                jwt_secret: "another-secret-that-is-also-long-enough!!".to_string(),
                ..AuthConfig::default()
            },
            SecurityConfig::default(),
        );
        let token = other
            .issue_token(&account(), TokenKind::Access, Duration::from_secs(60))
            .unwrap();
        assert!(test_credentials().validate_token(&token).is_err());
    }

    #[test]
    fn refresh_token_is_not_an_access_token() {
        let creds = test_credentials();
        let pair = creds.issue_token_pair(&account()).unwrap();
        assert!(creds.validate_token(&pair.refresh_token).is_err());
        assert!(creds.validate_refresh_token(&pair.refresh_token).is_ok());
        assert!(creds.validate_refresh_token(&pair.access_token).is_err());
        assert_eq!(pair.expires_in, 30 * 60);
    }

    #[test]
    fn opaque_tokens_are_64_hex_chars() {
        let token = generate_opaque_token();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(token, generate_opaque_token());
    }
}
