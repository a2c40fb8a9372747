//! HTTP API: routing, shared state, error mapping, and the admin-cookie
//! auth extractor.
//!
//! Handlers are thin: they parse the request, call into
//! [`CatalogService`]/[`EnrichmentCoordinator`], and map
//! [`RepodexError`] onto status codes via [`ApiError`].

mod admin;
mod categories;
mod repositories;
mod sitemap;

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post, put};
use axum::Router;
use axum_extra::extract::cookie::CookieJar;
use serde_json::json;
use tracing::error;

use repodex_core::{CatalogService, EnrichmentCoordinator};
use repodex_core::auth;
use repodex_shared::{Admin, RepodexError};
use repodex_storage::Storage;

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "access_token";

/// Application state shared by all handlers.
pub struct AppState {
    pub catalog: CatalogService,
    pub storage: Arc<Storage>,
    pub enrichment: Arc<EnrichmentCoordinator>,
    pub jwt_secret: String,
    pub token_ttl_minutes: i64,
    /// Base URL used in sitemap links, without a trailing slash.
    pub public_url: String,
}

pub type SharedState = Arc<AppState>;

/// Build the API router.
pub fn router(state: SharedState) -> Router {
    Router::new()
        .route(
            "/api/categories",
            get(categories::full_tree).post(categories::create),
        )
        .route("/api/categories/public", get(categories::public_tree))
        .route("/api/categories/flat", get(categories::flat))
        .route(
            "/api/categories/:id",
            put(categories::update).delete(categories::remove),
        )
        .route(
            "/api/repositories",
            get(repositories::list_public).post(repositories::create),
        )
        .route(
            "/api/repositories/generate-summary",
            post(repositories::generate_summary),
        )
        .route(
            "/api/repositories/:id",
            put(repositories::update).delete(repositories::remove),
        )
        .route("/api/admin/repositories", get(repositories::list_admin))
        .route(
            "/api/admin/configs",
            get(admin::list_configs).put(admin::update_configs),
        )
        .route("/api/admin/login", post(admin::login))
        .route("/api/admin/logout", post(admin::logout))
        .route("/api/admin/session", get(admin::session))
        .route("/sitemap.xml", get(sitemap::sitemap))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

/// Wrapper mapping [`RepodexError`] onto HTTP responses with the
/// `{"detail": ...}` body shape.
pub struct ApiError(RepodexError);

impl From<RepodexError> for ApiError {
    fn from(err: RepodexError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match &self.0 {
            RepodexError::Validation { .. } => (StatusCode::BAD_REQUEST, self.0.to_string()),
            RepodexError::Conflict { .. } => (StatusCode::CONFLICT, self.0.to_string()),
            RepodexError::NotFound { .. } => (StatusCode::NOT_FOUND, self.0.to_string()),
            RepodexError::Auth { .. } => (StatusCode::UNAUTHORIZED, self.0.to_string()),
            other => {
                error!(error = %other, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };

        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

// ---------------------------------------------------------------------------
// Admin auth extractor
// ---------------------------------------------------------------------------

/// Extractor that authenticates the session cookie and loads the admin row.
/// Rejects with 401 before the handler body runs.
pub struct AdminUser(pub Admin);

#[axum::async_trait]
impl FromRequestParts<SharedState> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let token = jar
            .get(SESSION_COOKIE)
            .map(|cookie| cookie.value().to_string())
            .ok_or_else(|| RepodexError::auth("not authenticated"))?;

        let username = auth::verify_access_token(&token, &state.jwt_secret)?;

        let admin = state
            .storage
            .get_admin_by_username(&username)
            .await?
            .ok_or_else(|| RepodexError::auth("not authenticated"))?;

        Ok(Self(admin))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn business_errors_map_to_client_statuses() {
        let cases = [
            (RepodexError::validation("bad"), StatusCode::BAD_REQUEST),
            (RepodexError::conflict("dup"), StatusCode::CONFLICT),
            (RepodexError::not_found("gone"), StatusCode::NOT_FOUND),
            (RepodexError::auth("nope"), StatusCode::UNAUTHORIZED),
            (
                RepodexError::Storage("disk".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            let response = ApiError(err).into_response();
            assert_eq!(response.status(), expected);
        }
    }
}
