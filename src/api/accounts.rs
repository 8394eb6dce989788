use axum::{
    Extension, Json,
    extract::{Multipart, Path, Query, State},
};
use std::sync::Arc;
use std::time::Duration;

use super::validation::{
    parse_account_id, parse_avatar_id, validate_bucket_name, validate_email_query,
};
use super::{ApiError, ApiResponse, AppState, AvatarUrlQuery, AvatarUrlResponse, EmailQuery, UploadQuery};
use crate::models::{Account, UploadInput};
use crate::services::Principal;

const UPLOAD_FIELD: &str = "file";

/// GET /accounts/{id}
pub async fn get_account(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Account>>, ApiError> {
    let id = parse_account_id(&id)?;
    let account = state.auth().get_by_id(id).await?;
    Ok(Json(ApiResponse::success(account)))
}

/// GET /accounts?email=
pub async fn find_account_by_email(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EmailQuery>,
) -> Result<Json<ApiResponse<Account>>, ApiError> {
    let email = validate_email_query(query.email.as_deref())?;
    let account = state.auth().find_by_email(email).await?;
    Ok(Json(ApiResponse::success(account)))
}

/// POST /accounts/me/avatar
///
/// Multipart upload with the image in the `file` field. The target bucket
/// comes from `?bucket=` or the configured default.
pub async fn upload_avatar(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<UploadQuery>,
    mut multipart: Multipart,
) -> Result<Json<ApiResponse<Account>>, ApiError> {
    let bucket = match query.bucket.as_deref() {
        Some(bucket) => validate_bucket_name(bucket)?.to_string(),
        None => state.config().storage.default_bucket.clone(),
    };

    let mut input = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::validation(format!("Malformed multipart body: {e}")))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let name = field.file_name().unwrap_or("avatar").to_string();
        let declared_content_type = field.content_type().map(str::to_string);
        let content = field
            .bytes()
            .await
            .map_err(|e| ApiError::validation(format!("Failed to read upload: {e}")))?;

        input = Some(UploadInput {
            size: content.len(),
            content,
            name,
            declared_content_type,
            bucket: bucket.clone(),
        });
        break;
    }

    let input = input.ok_or_else(|| {
        ApiError::validation(format!("Multipart field '{UPLOAD_FIELD}' is required"))
    })?;

    let account = state
        .auth()
        .upload_avatar(principal.account_id(), input)
        .await?;

    Ok(Json(ApiResponse::success(account)))
}

/// GET /avatars/{id}/url
pub async fn get_avatar_url(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<AvatarUrlQuery>,
) -> Result<Json<ApiResponse<AvatarUrlResponse>>, ApiError> {
    let id = parse_avatar_id(&id)?;
    let ttl = match query.ttl_seconds {
        Some(0) => return Err(ApiError::validation("ttl_seconds must be positive")),
        Some(secs) => Some(Duration::from_secs(secs)),
        None => None,
    };

    let url = state.auth().get_avatar_url(id, ttl).await?;
    Ok(Json(ApiResponse::success(AvatarUrlResponse {
        url: url.to_string(),
    })))
}
