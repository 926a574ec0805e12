//! Admin handlers: product management and maintenance settings.
//!
//! Admin routes sit outside the blocked surface so operators can manage the
//! store during a maintenance window. Authorization still applies: every
//! handler requires the admin role from the fronting auth proxy.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::domain::aggregates::product::{Product, ProductStatus};
use crate::domain::value_objects::{Money, Sku};
use crate::error::ApiError;
use crate::gate::enforce::ROLE_HEADER;
use crate::gate::policy::Role;
use crate::gate::settings::SettingsRecord;
use crate::routes::shop;
use crate::state::AppState;

fn require_admin(headers: &HeaderMap) -> Result<(), ApiError> {
    let role = headers
        .get(ROLE_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(Role::parse);
    if role == Some(Role::Admin) {
        Ok(())
    } else {
        Err(ApiError::Forbidden)
    }
}

pub async fn overview(State(s): State<AppState>, headers: HeaderMap) -> Result<Json<serde_json::Value>, ApiError> {
    require_admin(&headers)?;
    let products: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM products WHERE status <> 'archived'")
        .fetch_one(&s.db)
        .await?;
    let orders: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM orders").fetch_one(&s.db).await?;
    let maintenance = s.maintenance.load().await;
    Ok(Json(json!({
        "products": products.0,
        "orders": orders.0,
        "maintenance_enabled": maintenance.enabled,
    })))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateProductRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(min = 1, max = 50))]
    pub sku: Option<String>,
    pub description: Option<String>,
    #[validate(range(min = 0))]
    pub price: i64,
    pub category_id: Option<Uuid>,
    #[validate(range(min = 0))]
    pub inventory_quantity: Option<i32>,
}

pub async fn create_product(
    State(s): State<AppState>,
    headers: HeaderMap,
    Json(r): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<shop::Product>), ApiError> {
    require_admin(&headers)?;
    r.validate()?;

    let sku_raw = r
        .sku
        .unwrap_or_else(|| format!("SKU-{:08}", rand::random::<u32>() % 100_000_000));
    let sku = Sku::new(sku_raw).map_err(|err| ApiError::Conflict(err.to_string()))?;

    let mut product = Product::create(sku, &r.name, Money::new(r.price, &s.config.currency));
    if let Some(description) = &r.description {
        product.describe(description);
    }
    product.categorize(r.category_id);
    product.add_inventory(r.inventory_quantity.unwrap_or(0).max(0) as u32);
    product
        .publish()
        .map_err(|err| ApiError::Conflict(err.to_string()))?;

    let row = sqlx::query_as::<_, shop::Product>(
        "INSERT INTO products (id, sku, name, description, price, currency, category_id, \
         inventory_quantity, status, images, tags, metadata, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, '{}', '{}', '{}', NOW(), NOW()) RETURNING *",
    )
    .bind(product.id())
    .bind(product.sku().as_str())
    .bind(product.name())
    .bind(product.description())
    .bind(product.price().amount())
    .bind(product.price().currency())
    .bind(product.category_id())
    .bind(product.inventory().value() as i32)
    .bind(product.status().as_str())
    .fetch_one(&s.db)
    .await?;

    for event in product.take_events() {
        s.publish_event(&event).await;
    }
    Ok((StatusCode::CREATED, Json(row)))
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProductRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    pub description: Option<String>,
    #[validate(range(min = 0))]
    pub price: Option<i64>,
    pub category_id: Option<Uuid>,
    #[validate(range(min = 0))]
    pub inventory_quantity: Option<i32>,
}

pub async fn update_product(
    State(s): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(r): Json<UpdateProductRequest>,
) -> Result<Json<shop::Product>, ApiError> {
    require_admin(&headers)?;
    r.validate()?;
    let row = sqlx::query_as::<_, shop::Product>(
        "UPDATE products SET \
         name = COALESCE($2, name), \
         description = COALESCE($3, description), \
         price = COALESCE($4, price), \
         category_id = COALESCE($5, category_id), \
         inventory_quantity = COALESCE($6, inventory_quantity), \
         updated_at = NOW() \
         WHERE id = $1 AND status <> 'archived' RETURNING *",
    )
    .bind(id)
    .bind(&r.name)
    .bind(&r.description)
    .bind(r.price)
    .bind(r.category_id)
    .bind(r.inventory_quantity)
    .fetch_optional(&s.db)
    .await?
    .ok_or(ApiError::NotFound)?;
    Ok(Json(row))
}

pub async fn archive_product(
    State(s): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    require_admin(&headers)?;
    let result = sqlx::query("UPDATE products SET status = $2, updated_at = NOW() WHERE id = $1")
        .bind(id)
        .bind(ProductStatus::Archived.as_str())
        .execute(&s.db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound);
    }
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCategoryRequest {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    pub description: Option<String>,
    pub parent_id: Option<Uuid>,
}

pub async fn create_category(
    State(s): State<AppState>,
    headers: HeaderMap,
    Json(r): Json<CreateCategoryRequest>,
) -> Result<(StatusCode, Json<shop::Category>), ApiError> {
    require_admin(&headers)?;
    r.validate()?;
    let slug = r.name.to_lowercase().replace(' ', "-");
    let category = sqlx::query_as::<_, shop::Category>(
        "INSERT INTO categories (id, name, slug, description, parent_id, created_at) \
         VALUES ($1, $2, $3, $4, $5, NOW()) RETURNING *",
    )
    .bind(Uuid::now_v7())
    .bind(&r.name)
    .bind(&slug)
    .bind(&r.description)
    .bind(r.parent_id)
    .fetch_one(&s.db)
    .await?;
    Ok((StatusCode::CREATED, Json(category)))
}

pub async fn get_maintenance(State(s): State<AppState>, headers: HeaderMap) -> Result<Json<SettingsRecord>, ApiError> {
    require_admin(&headers)?;
    let record = sqlx::query_as::<_, SettingsRecord>(
        "SELECT enabled, starts_at, ends_at, title, message, countdown_label, updated_at \
         FROM maintenance_settings WHERE id = 1",
    )
    .fetch_optional(&s.db)
    .await?
    .ok_or(ApiError::NotFound)?;
    Ok(Json(record))
}

/// Partial update. Absent fields keep their value; window bounds take any
/// text and are parsed leniently at read time, so an empty string clears a
/// bound.
#[derive(Debug, Deserialize)]
pub struct UpdateMaintenanceRequest {
    pub enabled: Option<bool>,
    pub starts_at: Option<String>,
    pub ends_at: Option<String>,
    pub title: Option<String>,
    pub message: Option<String>,
    pub countdown_label: Option<String>,
}

pub async fn update_maintenance(
    State(s): State<AppState>,
    headers: HeaderMap,
    Json(r): Json<UpdateMaintenanceRequest>,
) -> Result<Json<SettingsRecord>, ApiError> {
    require_admin(&headers)?;
    let record = sqlx::query_as::<_, SettingsRecord>(
        "UPDATE maintenance_settings SET \
         enabled = COALESCE($1, enabled), \
         starts_at = COALESCE($2, starts_at), \
         ends_at = COALESCE($3, ends_at), \
         title = COALESCE($4, title), \
         message = COALESCE($5, message), \
         countdown_label = COALESCE($6, countdown_label), \
         updated_at = NOW() \
         WHERE id = 1 \
         RETURNING enabled, starts_at, ends_at, title, message, countdown_label, updated_at",
    )
    .bind(r.enabled)
    .bind(&r.starts_at)
    .bind(&r.ends_at)
    .bind(&r.title)
    .bind(&r.message)
    .bind(&r.countdown_label)
    .fetch_optional(&s.db)
    .await?
    .ok_or(ApiError::NotFound)?;

    s.broadcast_maintenance_change().await;
    Ok(Json(record))
}
