use axum::{
    Extension, Json,
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tower_sessions::cookie::{Cookie, SameSite};
use tracing::warn;

use super::{
    ApiError, ApiResponse, AppState, AuthResponse, LoginRequest, MeResponse, MessageResponse,
    RefreshRequest,
};
use crate::config::AuthConfig;
use crate::models::NewAccount;
use crate::services::auth_guard::cookie_value;
use crate::services::{AuthGuard, AuthResult, Principal, RefreshResult};

// ============================================================================
// Middleware
// ============================================================================

/// Resolves the principal with the route's strategy and stores it in the
/// request extensions.
pub async fn require_principal(
    State(guard): State<AuthGuard>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let principal = match guard.authenticate(request.headers()).await {
        Ok(principal) => principal,
        Err(e) => {
            metrics::counter!(
                "auth_guard_total",
                "strategy" => guard.strategy_name(),
                "outcome" => "rejected"
            )
            .increment(1);
            return Err(e.into());
        }
    };

    metrics::counter!(
        "auth_guard_total",
        "strategy" => guard.strategy_name(),
        "outcome" => "accepted"
    )
    .increment(1);
    tracing::Span::current().record("account_id", tracing::field::display(principal.account_id()));
    request.extensions_mut().insert(principal);

    Ok(next.run(request).await)
}

// ============================================================================
// Cookies
// ============================================================================

fn session_cookie(config: &AuthConfig, value: String, max_age: time::Duration) -> Cookie<'static> {
    Cookie::build((config.session_cookie_name.clone(), value))
        .path("/")
        .http_only(true)
        .secure(config.secure_cookies)
        .same_site(SameSite::Lax)
        .max_age(max_age)
        .build()
}

fn set_cookie_header(cookie: &Cookie<'_>) -> Result<HeaderValue, ApiError> {
    HeaderValue::from_str(&cookie.to_string())
        .map_err(|e| ApiError::internal(format!("Failed to encode cookie: {e}")))
}

fn session_response(
    config: &AuthConfig,
    status: StatusCode,
    result: AuthResult,
) -> Result<Response, ApiError> {
    let remaining = (result.session_expires_at - chrono::Utc::now()).num_seconds().max(0);
    let cookie = session_cookie(
        config,
        result.session_token,
        time::Duration::seconds(remaining),
    );

    let body = ApiResponse::success(AuthResponse {
        account: result.account,
        tokens: result.tokens,
    });

    Ok((
        status,
        [(header::SET_COOKIE, set_cookie_header(&cookie)?)],
        Json(body),
    )
        .into_response())
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /auth/register
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewAccount>,
) -> Result<Response, ApiError> {
    let result = state.auth().register(payload).await?;
    session_response(&state.config().auth, StatusCode::CREATED, result)
}

/// POST /auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LoginRequest>,
) -> Result<Response, ApiError> {
    let result = state.auth().login(&payload.email, &payload.password).await?;
    session_response(&state.config().auth, StatusCode::OK, result)
}

/// POST /auth/logout
/// Ends the session named by the cookie, if any, and clears the cookie.
pub async fn logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let config = &state.config().auth;

    if let Some(token) = cookie_value(&headers, &config.session_cookie_name) {
        state.auth().logout(&token).await?;
    }

    let cleared = session_cookie(config, String::new(), time::Duration::ZERO);

    Ok((
        [(header::SET_COOKIE, set_cookie_header(&cleared)?)],
        Json(ApiResponse::success(MessageResponse {
            message: "Logged out".to_string(),
        })),
    )
        .into_response())
}

/// POST /auth/refresh
pub async fn refresh(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<ApiResponse<RefreshResult>>, ApiError> {
    let result = state.auth().refresh(&payload.refresh_token).await?;
    Ok(Json(ApiResponse::success(result)))
}

/// GET /auth/me
/// Session-cookie principal plus a presigned avatar link.
pub async fn me(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<ApiResponse<MeResponse>>, ApiError> {
    let avatar_url = match principal.account.avatar_id {
        Some(avatar_id) => match state.auth().get_avatar_url(avatar_id, None).await {
            Ok(url) => Some(url.to_string()),
            Err(e) => {
                warn!(account_id = %principal.account_id(), error = %e, "Could not presign avatar");
                None
            }
        },
        None => None,
    };

    Ok(Json(ApiResponse::success(MeResponse {
        account: principal.account,
        avatar_url,
    })))
}
