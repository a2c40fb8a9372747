//! Admin session and configuration endpoints.

use std::collections::HashMap;

use axum::extract::State;
use axum::response::Json;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use repodex_core::auth;
use repodex_shared::ConfigEntry;

use super::{AdminUser, ApiError, SESSION_COOKIE, SharedState};

#[derive(Debug, Deserialize)]
pub(super) struct LoginRequest {
    username: String,
    password: String,
}

/// `POST /api/admin/login`: verify credentials and set the session cookie.
pub(super) async fn login(
    State(state): State<SharedState>,
    jar: CookieJar,
    Json(request): Json<LoginRequest>,
) -> Result<(CookieJar, Json<Value>), ApiError> {
    let admin = auth::authenticate(&state.storage, &request.username, &request.password).await?;

    let token = auth::create_access_token(
        &admin.username,
        &state.jwt_secret,
        state.token_ttl_minutes,
    )?;

    let cookie = Cookie::build((SESSION_COOKIE, token))
        .http_only(true)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(time::Duration::minutes(state.token_ttl_minutes))
        .build();

    info!(username = %admin.username, "admin logged in");
    Ok((
        jar.add(cookie),
        Json(json!({ "message": "logged in", "username": admin.username })),
    ))
}

/// `POST /api/admin/logout`: clear the session cookie.
pub(super) async fn logout(jar: CookieJar) -> (CookieJar, Json<Value>) {
    let removal = Cookie::build((SESSION_COOKIE, "")).path("/").build();
    (jar.remove(removal), Json(json!({ "message": "logged out" })))
}

/// `GET /api/admin/session`: who the current cookie belongs to.
pub(super) async fn session(AdminUser(admin): AdminUser) -> Json<Value> {
    Json(json!({ "username": admin.username }))
}

/// `GET /api/admin/configs`
pub(super) async fn list_configs(
    State(state): State<SharedState>,
    _admin: AdminUser,
) -> Result<Json<Vec<ConfigEntry>>, ApiError> {
    Ok(Json(state.storage.list_configs().await?))
}

/// `PUT /api/admin/configs`: batch key/value upsert.
pub(super) async fn update_configs(
    State(state): State<SharedState>,
    _admin: AdminUser,
    Json(entries): Json<HashMap<String, String>>,
) -> Result<Json<Value>, ApiError> {
    for (key, value) in &entries {
        state.storage.set_config(key, value).await?;
    }
    Ok(Json(json!({ "message": "configuration updated" })))
}
