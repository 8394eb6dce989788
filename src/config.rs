use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::services::credentials::generate_opaque_token;

/// Environment variable that overrides `auth.jwt_secret`.
pub const JWT_SECRET_ENV: &str = "GATEHOUSE_JWT_SECRET";

/// Environment variable that overrides `storage.signing_key`.
pub const SIGNING_KEY_ENV: &str = "GATEHOUSE_SIGNING_KEY";

/// Minimum accepted length for signing secrets, in bytes.
const MIN_SECRET_LEN: usize = 32;

const MAX_ACCESS_TOKEN_TTL_MINUTES: u64 = 24 * 60;
const MAX_REFRESH_TOKEN_TTL_DAYS: u64 = 365;
const MAX_SESSION_TTL_HOURS: u64 = 365 * 24;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,

    pub database: DatabaseConfig,

    pub cache: CacheConfig,

    pub storage: StorageConfig,

    pub auth: AuthConfig,

    pub security: SecurityConfig,

    pub server: ServerConfig,

    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub log_level: String,

    /// Number of tokio worker threads (default: 0 = number of CPU cores)
    pub worker_threads: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            worker_threads: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,

    pub max_connections: u32,

    pub min_connections: u32,

    /// Upper bound for acquiring a pooled connection, in seconds.
    pub acquire_timeout_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:data/gatehouse.db".to_string(),
            max_connections: 5,
            min_connections: 1,
            acquire_timeout_seconds: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// `memory` for the in-process cache, or a `redis://` URL.
    pub url: String,

    /// Namespace prepended to every cache key.
    pub key_prefix: String,

    /// Lifetime of cached identities, independent of session TTL.
    pub identity_ttl_seconds: u64,

    /// Upper bound for a single cache round trip, in milliseconds.
    pub response_timeout_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            url: "memory".to_string(),
            key_prefix: "gatehouse".to_string(),
            identity_ttl_seconds: 3600,
            response_timeout_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// `memory://`, `file:///path/to/dir` or `s3://root-bucket`.
    pub url: String,

    /// Base URL the presigned links point at (served by `/assets`).
    pub public_url: String,

    /// Bucket used when an upload does not name one.
    pub default_bucket: String,

    /// HMAC key for presigned URLs. Empty until set in the file or via `GATEHOUSE_SIGNING_KEY`.
    pub signing_key: String,

    /// Default lifetime of presigned avatar URLs (default: one week).
    pub presign_ttl_seconds: u64,

    /// Longest lifetime a caller may request for a presigned URL.
    pub max_presign_ttl_seconds: u64,

    pub max_upload_bytes: usize,

    /// Object key of an existing avatar row linked to new accounts.
    pub default_avatar_path: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            url: "memory://".to_string(),
            public_url: "http://localhost:6790/assets".to_string(),
            default_bucket: "avatars".to_string(),
            signing_key: String::new(),
            presign_ttl_seconds: 7 * 24 * 60 * 60,
            max_presign_ttl_seconds: 7 * 24 * 60 * 60,
            max_upload_bytes: 2 * 1024 * 1024,
            default_avatar_path: None,
        }
    }
}

impl StorageConfig {
    #[must_use]
    pub const fn presign_ttl(&self) -> Duration {
        Duration::from_secs(self.presign_ttl_seconds)
    }

    #[must_use]
    pub const fn max_presign_ttl(&self) -> Duration {
        Duration::from_secs(self.max_presign_ttl_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HMAC-SHA256 key for access and refresh tokens. Empty until set in the
    /// file or via `GATEHOUSE_JWT_SECRET`.
    pub jwt_secret: String,

    pub access_token_ttl_minutes: u64,

    pub refresh_token_ttl_days: u64,

    /// Lifetime of server-held sessions.
    pub session_ttl_hours: u64,

    pub session_cookie_name: String,

    /// Cookie consulted by the bearer strategy when no Authorization header is sent.
    pub token_cookie_name: String,

    /// Whether to set the Secure flag on auth cookies.
    /// Default: true for production safety. Set to false for local development without HTTPS.
    pub secure_cookies: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            access_token_ttl_minutes: 30,
            refresh_token_ttl_days: 30,
            session_ttl_hours: 30 * 24,
            session_cookie_name: "session-id".to_string(),
            token_cookie_name: "jwt-token".to_string(),
            secure_cookies: true,
        }
    }
}

impl AuthConfig {
    #[must_use]
    pub const fn access_token_ttl(&self) -> Duration {
        Duration::from_secs(self.access_token_ttl_minutes.saturating_mul(60))
    }

    #[must_use]
    pub const fn refresh_token_ttl(&self) -> Duration {
        Duration::from_secs(self.refresh_token_ttl_days.saturating_mul(24 * 60 * 60))
    }

    #[must_use]
    pub const fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_hours.saturating_mul(60 * 60))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Argon2 memory cost in KiB (default: 8192 = 8MB)
    pub argon2_memory_cost_kib: u32,

    /// Argon2 time cost (iterations) - higher = more CPU work
    pub argon2_time_cost: u32,

    /// Argon2 parallelism (default: 1)
    pub argon2_parallelism: u32,

    /// Minimum accepted password length at registration.
    pub min_password_length: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            argon2_memory_cost_kib: 8192,
            argon2_time_cost: 3,
            argon2_parallelism: 1,
            min_password_length: 6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub enabled: bool,

    pub port: u16,

    pub cors_allowed_origins: Vec<String>,

    /// Deadline applied to every request; in-flight store calls are dropped when it fires.
    pub request_timeout_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 6790,
            cors_allowed_origins: vec![
                "http://localhost:6790".to_string(),
                "http://127.0.0.1:6790".to_string(),
            ],
            request_timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub metrics_enabled: bool,

    pub loki_enabled: bool,

    pub loki_url: String,

    pub loki_labels: std::collections::HashMap<String, String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        let mut labels = std::collections::HashMap::new();
        labels.insert("app".to_string(), "gatehouse".to_string());

        Self {
            metrics_enabled: true,
            loki_enabled: false,
            loki_url: "http://localhost:3100".to_string(),
            loki_labels: labels,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let paths = Self::config_paths();

        for path in &paths {
            if path.exists() {
                info!("Loading config from: {}", path.display());
                let mut config = Self::load_from_path(path)?;
                config.apply_env_overrides();
                return Ok(config);
            }
        }

        info!("No config file found, using defaults");
        let mut config = Self::default();
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Config saved to: {}", path.display());
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(secret) = std::env::var(JWT_SECRET_ENV)
            && !secret.is_empty()
        {
            self.auth.jwt_secret = secret;
        }

        if let Ok(key) = std::env::var(SIGNING_KEY_ENV)
            && !key.is_empty()
        {
            self.storage.signing_key = key;
        }
    }

    fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![];

        paths.push(PathBuf::from("config.toml"));

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("gatehouse").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".gatehouse").join("config.toml"));
        }

        paths
    }

    fn default_config_path() -> PathBuf {
        PathBuf::from("config.toml")
    }

    pub fn create_default_if_missing() -> Result<bool> {
        let path = Self::default_config_path();
        if path.exists() {
            Ok(false)
        } else {
            let mut config = Self::default();
            config.auth.jwt_secret = generate_opaque_token();
            config.storage.signing_key = generate_opaque_token();
            config.save_to_path(&path)?;
            info!("Created default config file: {}", path.display());
            Ok(true)
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.auth.jwt_secret.len() < MIN_SECRET_LEN {
            anyhow::bail!(
                "auth.jwt_secret must be at least {MIN_SECRET_LEN} bytes (set it in config.toml or {JWT_SECRET_ENV})"
            );
        }

        if self.storage.signing_key.len() < MIN_SECRET_LEN {
            anyhow::bail!(
                "storage.signing_key must be at least {MIN_SECRET_LEN} bytes (set it in config.toml or {SIGNING_KEY_ENV})"
            );
        }

        if self.auth.access_token_ttl_minutes == 0
            || self.auth.refresh_token_ttl_days == 0
            || self.auth.session_ttl_hours == 0
        {
            anyhow::bail!("Token and session lifetimes must be > 0");
        }

        if self.auth.access_token_ttl_minutes > MAX_ACCESS_TOKEN_TTL_MINUTES {
            anyhow::bail!(
                "auth.access_token_ttl_minutes cannot exceed {MAX_ACCESS_TOKEN_TTL_MINUTES}"
            );
        }

        if self.auth.refresh_token_ttl_days > MAX_REFRESH_TOKEN_TTL_DAYS {
            anyhow::bail!("auth.refresh_token_ttl_days cannot exceed {MAX_REFRESH_TOKEN_TTL_DAYS}");
        }

        if self.auth.session_ttl_hours > MAX_SESSION_TTL_HOURS {
            anyhow::bail!("auth.session_ttl_hours cannot exceed {MAX_SESSION_TTL_HOURS}");
        }

        if self.cache.identity_ttl_seconds == 0 {
            anyhow::bail!("cache.identity_ttl_seconds must be > 0");
        }

        if self.storage.presign_ttl_seconds == 0
            || self.storage.presign_ttl_seconds > self.storage.max_presign_ttl_seconds
        {
            anyhow::bail!(
                "storage.presign_ttl_seconds must be between 1 and max_presign_ttl_seconds ({})",
                self.storage.max_presign_ttl_seconds
            );
        }

        if self.storage.default_bucket.is_empty() {
            anyhow::bail!("storage.default_bucket cannot be empty");
        }

        if self.database.min_connections > self.database.max_connections {
            anyhow::bail!("database.min_connections cannot exceed max_connections");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        let mut config = Config::default();
        config.auth.jwt_secret = "j".repeat(MIN_SECRET_LEN);
        config.storage.signing_key = "s".repeat(MIN_SECRET_LEN);
        config
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.auth.access_token_ttl(), Duration::from_secs(30 * 60));
        assert_eq!(
            config.auth.refresh_token_ttl(),
            Duration::from_secs(30 * 24 * 60 * 60)
        );
        assert_eq!(config.auth.session_cookie_name, "session-id");
        assert_eq!(config.storage.presign_ttl_seconds, 604_800);
        assert_eq!(config.storage.max_upload_bytes, 2 * 1024 * 1024);
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_default_config_has_no_usable_secrets() {
        let config = Config::default();
        assert!(config.auth.jwt_secret.is_empty());
        assert!(config.storage.signing_key.is_empty());

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains(JWT_SECRET_ENV));

        let mut config = Config::default();
        config.auth.jwt_secret = "j".repeat(MIN_SECRET_LEN);
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains(SIGNING_KEY_ENV));
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[auth]"));
        assert!(toml_str.contains("[storage]"));
        assert!(toml_str.contains("[cache]"));
    }

    #[test]
    fn test_config_deserialization() {
        let toml_str = r#"
            [general]
            log_level = "debug"

            [auth]
            access_token_ttl_minutes = 5
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.auth.access_token_ttl_minutes, 5);

        assert_eq!(config.auth.refresh_token_ttl_days, 30);
        assert_eq!(config.cache.url, "memory");
    }

    #[test]
    fn test_validate_rejects_short_secret() {
        let mut config = valid_config();
        config.auth.jwt_secret = "short".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_presign_above_maximum() {
        let mut config = valid_config();
        config.storage.presign_ttl_seconds = config.storage.max_presign_ttl_seconds + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_huge_lifetimes_saturate_and_are_rejected() {
        let mut config = valid_config();
        config.auth.access_token_ttl_minutes = u64::MAX;
        config.auth.refresh_token_ttl_days = u64::MAX;
        config.auth.session_ttl_hours = u64::MAX;

        assert_eq!(config.auth.access_token_ttl(), Duration::from_secs(u64::MAX));
        assert_eq!(config.auth.refresh_token_ttl(), Duration::from_secs(u64::MAX));
        assert_eq!(config.auth.session_ttl(), Duration::from_secs(u64::MAX));
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.auth.refresh_token_ttl_days = MAX_REFRESH_TOKEN_TTL_DAYS;
        config.auth.session_ttl_hours = MAX_SESSION_TTL_HOURS;
        config.auth.access_token_ttl_minutes = MAX_ACCESS_TOKEN_TTL_MINUTES;
        assert!(config.validate().is_ok());

        config.auth.session_ttl_hours = MAX_SESSION_TTL_HOURS + 1;
        assert!(config.validate().is_err());
    }
}
