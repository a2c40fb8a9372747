//! Repository catalog endpoints.

use axum::extract::{Path, Query, State};
use axum::response::Json;
use serde::Deserialize;
use serde_json::{Value, json};

use repodex_core::{NewRepository, SummaryOutcome, UpdateRepository};
use repodex_shared::{Page, RepodexError, Repository, RepositoryView};

use super::{AdminUser, ApiError, SharedState};

/// Shared listing query parameters.
#[derive(Debug, Deserialize)]
pub(super) struct ListQuery {
    q: Option<String>,
    category_id: Option<i64>,
    #[serde(default = "default_page")]
    page: u32,
    page_size: Option<u32>,
}

fn default_page() -> u32 {
    1
}

/// `GET /api/repositories`: public listing, default page size 50.
pub(super) async fn list_public(
    State(state): State<SharedState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Page<RepositoryView>>, ApiError> {
    let page = state
        .catalog
        .list_repositories(
            query.q.as_deref(),
            query.category_id,
            query.page,
            query.page_size.unwrap_or(50),
        )
        .await?;
    Ok(Json(page))
}

/// `GET /api/admin/repositories`: same contract, default page size 20.
pub(super) async fn list_admin(
    State(state): State<SharedState>,
    _admin: AdminUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<Page<RepositoryView>>, ApiError> {
    let page = state
        .catalog
        .list_repositories(
            query.q.as_deref(),
            query.category_id,
            query.page,
            query.page_size.unwrap_or(20),
        )
        .await?;
    Ok(Json(page))
}

/// `POST /api/repositories`
pub(super) async fn create(
    State(state): State<SharedState>,
    _admin: AdminUser,
    Json(input): Json<NewRepository>,
) -> Result<Json<Repository>, ApiError> {
    Ok(Json(state.catalog.create_repository(input).await?))
}

/// `PUT /api/repositories/:id`
pub(super) async fn update(
    State(state): State<SharedState>,
    _admin: AdminUser,
    Path(id): Path<i64>,
    Json(input): Json<UpdateRepository>,
) -> Result<Json<Repository>, ApiError> {
    Ok(Json(state.catalog.update_repository(id, input).await?))
}

/// `DELETE /api/repositories/:id`
pub(super) async fn remove(
    State(state): State<SharedState>,
    _admin: AdminUser,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    state.catalog.delete_repository(id).await?;
    Ok(Json(json!({ "message": "repository deleted" })))
}

#[derive(Debug, Deserialize)]
pub(super) struct SummaryRequest {
    github_url: Option<String>,
}

/// `POST /api/repositories/generate-summary`: synchronous enrichment for
/// the admin UI. Failures are reported in the body, not the status code.
pub(super) async fn generate_summary(
    State(state): State<SharedState>,
    _admin: AdminUser,
    Json(request): Json<SummaryRequest>,
) -> Result<Json<SummaryOutcome>, ApiError> {
    let github_url = request
        .github_url
        .as_deref()
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .ok_or_else(|| RepodexError::validation("github_url is required"))?;

    Ok(Json(state.enrichment.generate_summary(github_url).await))
}
