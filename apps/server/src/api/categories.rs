//! Category tree endpoints.

use axum::extract::{Path, State};
use axum::response::Json;
use serde_json::{Value, json};

use repodex_core::{NewCategory, UpdateCategory};
use repodex_shared::{Category, CategoryNode};

use super::{AdminUser, ApiError, SharedState};

/// `GET /api/categories`: full forest, including empty branches.
pub(super) async fn full_tree(
    State(state): State<SharedState>,
) -> Result<Json<Vec<CategoryNode>>, ApiError> {
    Ok(Json(state.catalog.category_tree(false).await?))
}

/// `GET /api/categories/public`: only branches that lead to repositories.
pub(super) async fn public_tree(
    State(state): State<SharedState>,
) -> Result<Json<Vec<CategoryNode>>, ApiError> {
    Ok(Json(state.catalog.category_tree(true).await?))
}

/// `GET /api/categories/flat`
pub(super) async fn flat(
    State(state): State<SharedState>,
) -> Result<Json<Vec<Category>>, ApiError> {
    Ok(Json(state.catalog.flat_categories().await?))
}

/// `POST /api/categories`
pub(super) async fn create(
    State(state): State<SharedState>,
    _admin: AdminUser,
    Json(input): Json<NewCategory>,
) -> Result<Json<Category>, ApiError> {
    Ok(Json(state.catalog.create_category(input).await?))
}

/// `PUT /api/categories/:id`
pub(super) async fn update(
    State(state): State<SharedState>,
    _admin: AdminUser,
    Path(id): Path<i64>,
    Json(input): Json<UpdateCategory>,
) -> Result<Json<Category>, ApiError> {
    Ok(Json(state.catalog.update_category(id, input).await?))
}

/// `DELETE /api/categories/:id`
pub(super) async fn remove(
    State(state): State<SharedState>,
    _admin: AdminUser,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    state.catalog.delete_category(id).await?;
    Ok(Json(json!({ "message": "category deleted" })))
}
