//! Service-level routes: landing, diagnostics, session info.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde_json::json;

use crate::error::ApiError;
use crate::gate::enforce::ROLE_HEADER;
use crate::gate::policy::Role;
use crate::state::AppState;

pub async fn index() -> Json<serde_json::Value> {
    Json(json!({
        "service": "storefront",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "ok",
    }))
}

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy", "service": "storefront" }))
}

pub async fn ready(State(s): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    sqlx::query("SELECT 1").execute(&s.db).await?;
    Ok(Json(json!({ "status": "ready" })))
}

fn role_of(headers: &HeaderMap) -> Option<Role> {
    headers
        .get(ROLE_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(Role::parse)
}

/// Session info as the external identity provider reports it.
pub async fn auth_session(headers: HeaderMap) -> Json<serde_json::Value> {
    let role = role_of(&headers);
    Json(json!({
        "authenticated": role.is_some(),
        "role": role.map(|r| match r { Role::Admin => "admin", Role::Customer => "customer" }),
    }))
}

pub async fn account(headers: HeaderMap) -> Result<Json<serde_json::Value>, ApiError> {
    match role_of(&headers) {
        Some(role) => Ok(Json(json!({
            "authenticated": true,
            "role": match role { Role::Admin => "admin", Role::Customer => "customer" },
        }))),
        None => Err(ApiError::Forbidden),
    }
}
