//! Tags and ingredients: list and create, always scoped to the caller.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Extension, Json,
};
use std::sync::Arc;

use super::{AppError, AppState};
use crate::models::User;
use crate::serializers::{AttributePayload, AttributeResponse};
use crate::storage::AttributeKind;

fn list_attributes(
    state: &AppState,
    user: &User,
    kind: AttributeKind,
) -> Result<Json<Vec<AttributeResponse>>, AppError> {
    let items = state.storage.list_attributes(kind, user.id)?;
    Ok(Json(items.iter().map(AttributeResponse::from).collect()))
}

/// The owner is the authenticated user; anything the body says about
/// ownership is ignored.
fn create_attribute(
    state: &AppState,
    user: &User,
    kind: AttributeKind,
    payload: Result<Json<AttributePayload>, JsonRejection>,
) -> Result<(StatusCode, Json<AttributeResponse>), AppError> {
    let Json(payload) = payload?;
    let name = payload.validate()?;
    let attribute = state.storage.create_attribute(kind, user.id, &name)?;
    Ok((StatusCode::CREATED, Json(AttributeResponse::from(&attribute))))
}

pub async fn list_tags_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
) -> Result<Json<Vec<AttributeResponse>>, AppError> {
    list_attributes(&state, &user, AttributeKind::Tag)
}

pub async fn create_tag_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    payload: Result<Json<AttributePayload>, JsonRejection>,
) -> Result<(StatusCode, Json<AttributeResponse>), AppError> {
    create_attribute(&state, &user, AttributeKind::Tag, payload)
}

pub async fn list_ingredients_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
) -> Result<Json<Vec<AttributeResponse>>, AppError> {
    list_attributes(&state, &user, AttributeKind::Ingredient)
}

pub async fn create_ingredient_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    payload: Result<Json<AttributePayload>, JsonRejection>,
) -> Result<(StatusCode, Json<AttributeResponse>), AppError> {
    create_attribute(&state, &user, AttributeKind::Ingredient, payload)
}
