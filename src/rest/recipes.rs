use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Multipart, Path, Query, State,
    },
    http::StatusCode,
    Extension, Json,
};
use std::sync::Arc;
use tracing::{debug, info};

use super::{AppError, AppState};
use crate::media::MediaError;
use crate::models::{Recipe, User};
use crate::query::{RecipeFilter, RecipeListParams};
use crate::serializers::{
    check_relations, encode_recipe, RecipeAction, RecipeBody, RecipePayload,
};

const IMAGE_FIELD: &str = "image";

/// Non-numeric ids cannot name a recipe, so they are simply not found.
fn parse_id(raw: &str) -> Result<u64, AppError> {
    raw.parse().map_err(|_| AppError::NotFound)
}

fn owned_recipe(state: &AppState, user: &User, id: u64) -> Result<Recipe, AppError> {
    state.storage.get_recipe(user.id, id)?.ok_or(AppError::NotFound)
}

fn respond(state: &AppState, action: RecipeAction, recipe: Recipe) -> Result<Json<RecipeBody>, AppError> {
    Ok(Json(encode_recipe(&state.storage, action.view(), recipe)?))
}

pub async fn list_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    params: Result<Query<RecipeListParams>, QueryRejection>,
) -> Result<Json<Vec<RecipeBody>>, AppError> {
    let Query(params) = params?;
    let filter = RecipeFilter::from_params(user.id, &params)?;
    let view = RecipeAction::List.view();

    let recipes = state.storage.list_recipes(&filter)?;
    debug!(user_id = user.id, count = recipes.len(), "Listed recipes");
    let bodies = recipes
        .into_iter()
        .map(|recipe| encode_recipe(&state.storage, view, recipe))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(bodies))
}

pub async fn create_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    payload: Result<Json<RecipePayload>, JsonRejection>,
) -> Result<(StatusCode, Json<RecipeBody>), AppError> {
    let Json(payload) = payload?;
    let changes = payload.validate(false)?;
    check_relations(&state.storage, user.id, &changes)??;

    let recipe = state.storage.create_recipe(user.id, changes)?;
    info!(user_id = user.id, recipe_id = recipe.id, "Created recipe");
    Ok((StatusCode::CREATED, respond(&state, RecipeAction::Create, recipe)?))
}

pub async fn retrieve_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
) -> Result<Json<RecipeBody>, AppError> {
    let recipe = owned_recipe(&state, &user, parse_id(&id)?)?;
    respond(&state, RecipeAction::Retrieve, recipe)
}

async fn update(
    state: &AppState,
    user: &User,
    id: &str,
    payload: Result<Json<RecipePayload>, JsonRejection>,
    action: RecipeAction,
) -> Result<Json<RecipeBody>, AppError> {
    let id = owned_recipe(state, user, parse_id(id)?)?.id;
    let Json(payload) = payload?;
    let changes = payload.validate(action == RecipeAction::PartialUpdate)?;
    check_relations(&state.storage, user.id, &changes)??;

    let recipe = state
        .storage
        .update_recipe(user.id, id, changes)?
        .ok_or(AppError::NotFound)?;
    respond(state, action, recipe)
}

pub async fn update_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
    payload: Result<Json<RecipePayload>, JsonRejection>,
) -> Result<Json<RecipeBody>, AppError> {
    update(&state, &user, &id, payload, RecipeAction::Update).await
}

pub async fn partial_update_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
    payload: Result<Json<RecipePayload>, JsonRejection>,
) -> Result<Json<RecipeBody>, AppError> {
    update(&state, &user, &id, payload, RecipeAction::PartialUpdate).await
}

pub async fn destroy_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let id = parse_id(&id)?;
    if !state.storage.delete_recipe(user.id, id)? {
        return Err(AppError::NotFound);
    }
    info!(user_id = user.id, recipe_id = id, "Deleted recipe");
    Ok(StatusCode::NO_CONTENT)
}

/// Attach an image to an owned recipe. Nothing is written unless the
/// payload is a valid image.
pub async fn upload_image_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<RecipeBody>, AppError> {
    let id = owned_recipe(&state, &user, parse_id(&id)?)?.id;

    let mut image = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some(IMAGE_FIELD) {
            image = Some(field.bytes().await?);
            break;
        }
    }
    let bytes = image.ok_or(MediaError::Missing)?;

    let stored = state.media.save_recipe_image(&bytes).await?;
    let recipe = match state.storage.set_recipe_image(user.id, id, &stored.url) {
        Ok(Some(recipe)) => recipe,
        Ok(None) => {
            state.media.discard(&stored).await;
            return Err(AppError::NotFound);
        }
        Err(e) => {
            state.media.discard(&stored).await;
            return Err(e.into());
        }
    };
    info!(user_id = user.id, recipe_id = id, image = %stored.url, "Uploaded recipe image");
    respond(&state, RecipeAction::UploadImage, recipe)
}
