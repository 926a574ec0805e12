//! Catalog browsing handlers.

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Product {
    pub id: Uuid, pub sku: String, pub name: String, pub description: Option<String>,
    pub price: i64, pub compare_at_price: Option<i64>, pub currency: String,
    pub category_id: Option<Uuid>, pub inventory_quantity: i32, pub status: String,
    pub images: Vec<String>, pub tags: Vec<String>, pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>, pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Category { pub id: Uuid, pub name: String, pub slug: String, pub description: Option<String>, pub parent_id: Option<Uuid>, pub image_url: Option<String>, pub created_at: DateTime<Utc> }

#[derive(Debug, Deserialize)]
pub struct ListParams { pub page: Option<u32>, pub per_page: Option<u32>, pub category: Option<Uuid>, pub search: Option<String> }

#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T> { pub data: Vec<T>, pub total: i64, pub page: u32 }

pub async fn list_products(State(s): State<AppState>, Query(p): Query<ListParams>) -> Result<Json<PaginatedResponse<Product>>, ApiError> {
    let page = p.page.unwrap_or(1).max(1);
    let per_page = p.per_page.unwrap_or(20).min(100);
    let products = sqlx::query_as::<_, Product>(
        "SELECT * FROM products WHERE status = 'active' \
         AND ($3::uuid IS NULL OR category_id = $3) \
         AND ($4::text IS NULL OR name ILIKE '%' || $4 || '%') \
         ORDER BY created_at DESC LIMIT $1 OFFSET $2",
    )
    .bind(per_page as i64)
    .bind(((page - 1) * per_page) as i64)
    .bind(p.category)
    .bind(&p.search)
    .fetch_all(&s.db)
    .await?;
    let total: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM products WHERE status = 'active' \
         AND ($1::uuid IS NULL OR category_id = $1) \
         AND ($2::text IS NULL OR name ILIKE '%' || $2 || '%')",
    )
    .bind(p.category)
    .bind(&p.search)
    .fetch_one(&s.db)
    .await?;
    Ok(Json(PaginatedResponse { data: products, total: total.0, page }))
}

pub async fn get_product(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Product>, ApiError> {
    sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1 AND status <> 'archived'")
        .bind(id)
        .fetch_optional(&s.db)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound)
}

pub async fn list_categories(State(s): State<AppState>) -> Result<Json<Vec<Category>>, ApiError> {
    let categories = sqlx::query_as::<_, Category>("SELECT * FROM categories ORDER BY name")
        .fetch_all(&s.db)
        .await?;
    Ok(Json(categories))
}

pub async fn get_category(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Category>, ApiError> {
    sqlx::query_as::<_, Category>("SELECT * FROM categories WHERE id = $1")
        .bind(id)
        .fetch_optional(&s.db)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound)
}
