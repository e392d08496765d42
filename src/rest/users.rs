use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Extension, Json,
};
use std::sync::Arc;
use tracing::info;

use super::{AppError, AppState};
use crate::auth::{create_jwt, hash_password, verify_password};
use crate::models::{User, UserChanges};
use crate::serializers::{TokenPayload, TokenResponse, UserPayload, UserResponse};

const BAD_CREDENTIALS: &str = "Unable to authenticate with provided credentials";

/// bcrypt runs on the blocking pool.
async fn hash_off_thread(password: String) -> Result<String, AppError> {
    Ok(tokio::task::spawn_blocking(move || hash_password(&password)).await??)
}

async fn verify_off_thread(password: String, hash: String) -> Result<bool, AppError> {
    Ok(tokio::task::spawn_blocking(move || verify_password(&password, &hash)).await??)
}

pub async fn register_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<UserPayload>, JsonRejection>,
) -> Result<(StatusCode, Json<UserResponse>), AppError> {
    let Json(payload) = payload?;
    let input = payload.validate(false)?;
    let (Some(email), Some(password), Some(name)) = (input.email, input.password, input.name) else {
        return Err(AppError::Internal("validated registration is missing fields".to_string()));
    };

    let hash = hash_off_thread(password).await?;
    let user = state.storage.create_user(&email, &hash, &name, false, false)?;
    info!(user_id = user.id, "Registered user");
    Ok((StatusCode::CREATED, Json(UserResponse::from(&user))))
}

pub async fn token_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<TokenPayload>, JsonRejection>,
) -> Result<Json<TokenResponse>, AppError> {
    let Json(payload) = payload?;
    let (email, password) = payload.validate()?;

    let Some(user) = state.storage.get_user_by_email(&email)? else {
        return Err(AppError::non_field(BAD_CREDENTIALS));
    };
    if !user.is_active || !verify_off_thread(password, user.password_hash.clone()).await? {
        return Err(AppError::non_field(BAD_CREDENTIALS));
    }

    let token = create_jwt(
        user.id,
        state.config.jwt_secret.as_bytes(),
        state.config.token_ttl_secs,
    )?;
    Ok(Json(TokenResponse { token }))
}

pub async fn me_handler(Extension(user): Extension<User>) -> Json<UserResponse> {
    Json(UserResponse::from(&user))
}

async fn update_me(
    state: &AppState,
    user: &User,
    payload: UserPayload,
    partial: bool,
) -> Result<Json<UserResponse>, AppError> {
    let input = payload.validate(partial)?;
    let password_hash = match input.password {
        Some(password) => Some(hash_off_thread(password).await?),
        None => None,
    };
    let updated = state.storage.update_user(
        user.id,
        UserChanges {
            email: input.email,
            password_hash,
            name: input.name,
        },
    )?;
    Ok(Json(UserResponse::from(&updated)))
}

pub async fn update_me_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    payload: Result<Json<UserPayload>, JsonRejection>,
) -> Result<Json<UserResponse>, AppError> {
    let Json(payload) = payload?;
    update_me(&state, &user, payload, false).await
}

pub async fn partial_update_me_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    payload: Result<Json<UserPayload>, JsonRejection>,
) -> Result<Json<UserResponse>, AppError> {
    let Json(payload) = payload?;
    update_me(&state, &user, payload, true).await
}
