use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::HeaderValue,
    middleware,
    routing::{get, post},
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::clients::object_storage::ObjectStorage;
use crate::config::Config;
use crate::db::Store;
use crate::services::AuthService;
use crate::state::SharedState;

mod accounts;
mod assets;
pub mod auth;
mod error;
mod observability;
mod types;
mod validation;

pub use error::ApiError;
pub use types::*;

/// Headroom for multipart framing on top of the image itself.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub shared: Arc<SharedState>,

    pub start_time: std::time::Instant,

    pub prometheus_handle: Option<PrometheusHandle>,
}

impl AppState {
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    #[must_use]
    pub fn store(&self) -> &Store {
        &self.shared.store
    }

    #[must_use]
    pub fn auth(&self) -> &Arc<dyn AuthService> {
        &self.shared.auth_service
    }

    #[must_use]
    pub fn storage(&self) -> &Arc<dyn ObjectStorage> {
        &self.shared.storage
    }
}

#[must_use]
pub fn create_app_state(
    shared: Arc<SharedState>,
    prometheus_handle: Option<PrometheusHandle>,
) -> Arc<AppState> {
    Arc::new(AppState {
        shared,
        start_time: std::time::Instant::now(),
        prometheus_handle,
    })
}

pub async fn create_app_state_from_config(
    config: Config,
    prometheus_handle: Option<PrometheusHandle>,
) -> anyhow::Result<Arc<AppState>> {
    let shared = Arc::new(SharedState::new(config).await?);
    Ok(create_app_state(shared, prometheus_handle))
}

pub fn router(state: Arc<AppState>) -> Router {
    let server = &state.config().server;
    let cors_origins = server.cors_allowed_origins.clone();
    let request_timeout = Duration::from_secs(server.request_timeout_seconds);

    let api_router = Router::new()
        .merge(session_routes(&state))
        .merge(bearer_routes(&state))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/refresh", post(auth::refresh))
        .route("/metrics", get(observability::get_metrics));

    let cors_layer = if cors_origins.iter().any(|o| o == "*") {
        CorsLayer::new().allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> =
            cors_origins.iter().filter_map(|s| s.parse().ok()).collect();
        CorsLayer::new().allow_origin(origins)
    };

    Router::new()
        .nest("/api", api_router)
        .route("/assets/{bucket}/{*key}", get(assets::serve_presigned))
        .with_state(state)
        .layer(middleware::from_fn(observability::logging_middleware))
        .layer(middleware::from_fn(
            observability::security_headers_middleware,
        ))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(cors_layer.allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
}

/// Routes that identify the caller by the session cookie.
fn session_routes(state: &AppState) -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/me", get(auth::me))
        .route_layer(middleware::from_fn_with_state(
            state.shared.session_guard(),
            auth::require_principal,
        ))
}

/// Routes that identify the caller by an access token.
fn bearer_routes(state: &AppState) -> Router<Arc<AppState>> {
    let upload_limit = state.config().storage.max_upload_bytes + MULTIPART_OVERHEAD_BYTES;

    Router::new()
        .route("/accounts", get(accounts::find_account_by_email))
        .route("/accounts/{id}", get(accounts::get_account))
        .route(
            "/accounts/me/avatar",
            post(accounts::upload_avatar).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/avatars/{id}/url", get(accounts::get_avatar_url))
        .route_layer(middleware::from_fn_with_state(
            state.shared.bearer_guard(),
            auth::require_principal,
        ))
}
