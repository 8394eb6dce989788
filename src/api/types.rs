use serde::{Deserialize, Serialize};

use crate::models::Account;
use crate::services::TokenPair;

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub const fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub account: Account,
    pub tokens: TokenPair,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub account: Account,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AvatarUrlResponse {
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct EmailQuery {
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    pub bucket: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AvatarUrlQuery {
    pub ttl_seconds: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct PresignedQuery {
    pub expires: i64,
    pub signature: String,
}
