//! REST API layer (Axum)
//!
//! Public routes: health, OpenAPI schema, registration, token issuance and
//! uploaded media. Everything under `/api/users/me/` and `/api/recipe/`
//! sits behind [`auth_middleware`], which resolves the bearer token to a
//! [`User`] and stores it in the request extensions for the handlers.

use axum::{
    extract::{DefaultBodyLimit, Request, State},
    http::header,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::debug;
use utoipa::OpenApi;

use crate::auth::validate_jwt;
use crate::config::Config;
use crate::media::{MediaStore, MEDIA_URL};
use crate::models::User;
use crate::serializers::ApiDoc;
use crate::storage::Storage;

pub mod attributes;
pub mod error;
pub mod recipes;
pub mod users;

pub use error::AppError;

/// Multipart framing on top of the image itself.
const UPLOAD_OVERHEAD_BYTES: usize = 64 * 1024;

/// Shared app state for REST handlers (Arc-wrapped for concurrency)
pub struct AppState {
    pub storage: Storage,
    pub media: MediaStore,
    pub config: Config,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::Unauthorized("Authentication credentials were not provided.".to_string()))?;

    let claims = validate_jwt(token, state.config.jwt_secret.as_bytes()).map_err(|e| {
        debug!(error = %e, "Rejected bearer token");
        AppError::Unauthorized("Invalid token.".to_string())
    })?;
    let user_id: u64 = claims
        .sub
        .parse()
        .map_err(|_| AppError::Unauthorized("Invalid token.".to_string()))?;

    let user: User = state
        .storage
        .get_user(user_id)?
        .filter(|user| user.is_active)
        .ok_or_else(|| AppError::Unauthorized("User inactive or deleted.".to_string()))?;

    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

/// Create the Axum router over the given storage and configuration.
pub fn create_router(storage: Storage, config: Config) -> Router {
    let media = MediaStore::new(config.media_root.clone(), config.max_upload_bytes);
    let upload_limit = config.max_upload_bytes + UPLOAD_OVERHEAD_BYTES;
    let state = Arc::new(AppState {
        storage,
        media,
        config,
    });

    let auth_routes = Router::new()
        .route(
            "/api/users/me/",
            get(users::me_handler)
                .put(users::update_me_handler)
                .patch(users::partial_update_me_handler),
        )
        .route(
            "/api/recipe/tags/",
            get(attributes::list_tags_handler).post(attributes::create_tag_handler),
        )
        .route(
            "/api/recipe/ingredients/",
            get(attributes::list_ingredients_handler).post(attributes::create_ingredient_handler),
        )
        .route(
            "/api/recipe/recipes/",
            get(recipes::list_handler).post(recipes::create_handler),
        )
        .route(
            "/api/recipe/recipes/:id/",
            get(recipes::retrieve_handler)
                .put(recipes::update_handler)
                .patch(recipes::partial_update_handler)
                .delete(recipes::destroy_handler),
        )
        .route(
            "/api/recipe/recipes/:id/upload-image/",
            post(recipes::upload_image_handler).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/schema/", get(schema_handler))
        .route("/api/users/", post(users::register_handler))
        .route("/api/users/token/", post(users::token_handler))
        .nest_service(MEDIA_URL, ServeDir::new(state.media.root().to_path_buf()))
        .merge(auth_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

async fn schema_handler() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
