use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use super::{ApiError, AppState, PresignedQuery};
use crate::clients::object_storage::StorageError;
use crate::services::image::ImageType;

/// GET /assets/{bucket}/{*key}
///
/// Serves an object named by a presigned link.
pub async fn serve_presigned(
    State(state): State<Arc<AppState>>,
    Path((bucket, key)): Path<(String, String)>,
    Query(query): Query<PresignedQuery>,
) -> Result<Response, ApiError> {
    state
        .storage()
        .verify_presigned(&bucket, &key, query.expires, &query.signature)
        .map_err(storage_error)?;

    let object = state
        .storage()
        .get_object(&bucket, &key)
        .await
        .map_err(storage_error)?;

    let content_type = object
        .content_type
        .or_else(|| ImageType::detect(&object.content).map(|t| t.mime().to_string()))
        .unwrap_or_else(|| "application/octet-stream".to_string());

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, "private, max-age=300".to_string()),
        ],
        Body::from(object.content),
    )
        .into_response())
}

fn storage_error(err: StorageError) -> ApiError {
    match err {
        StorageError::Expired => ApiError::Forbidden("Link has expired".to_string()),
        StorageError::BadSignature => ApiError::Forbidden("Invalid link signature".to_string()),
        StorageError::NotFound(path) => ApiError::NotFound(format!("Object {path} not found")),
        other => ApiError::internal(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn signature_failures_are_forbidden() {
        for err in [StorageError::Expired, StorageError::BadSignature] {
            assert_eq!(storage_error(err).into_response().status(), StatusCode::FORBIDDEN);
        }
        assert_eq!(
            storage_error(StorageError::NotFound("a/b".into()))
                .into_response()
                .status(),
            StatusCode::NOT_FOUND
        );
    }
}
