//! Order history handlers.

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;
use crate::routes::shop::PaginatedResponse;
use crate::state::AppState;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Order {
    pub id: Uuid, pub order_number: String, pub customer_email: String,
    pub status: String, pub payment_status: String,
    pub subtotal: i64, pub shipping: i64, pub total: i64, pub currency: String,
    pub shipping_address: serde_json::Value,
    pub payment_token: Option<String>, pub payment_redirect_url: Option<String>,
    pub created_at: DateTime<Utc>, pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct OrderItem {
    pub id: Uuid, pub order_id: Uuid, pub product_id: Uuid,
    pub sku: String, pub name: String, pub quantity: i32,
    pub unit_price: i64, pub total: i64,
}

#[derive(Debug, Serialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Deserialize)]
pub struct OrderListParams { pub page: Option<u32>, pub per_page: Option<u32>, pub email: Option<String> }

pub async fn list_orders(State(s): State<AppState>, Query(p): Query<OrderListParams>) -> Result<Json<PaginatedResponse<Order>>, ApiError> {
    let page = p.page.unwrap_or(1).max(1);
    let per_page = p.per_page.unwrap_or(20).min(100);
    let orders = sqlx::query_as::<_, Order>(
        "SELECT * FROM orders WHERE ($3::text IS NULL OR customer_email = $3) \
         ORDER BY created_at DESC LIMIT $1 OFFSET $2",
    )
    .bind(per_page as i64)
    .bind(((page - 1) * per_page) as i64)
    .bind(&p.email)
    .fetch_all(&s.db)
    .await?;
    let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM orders WHERE ($1::text IS NULL OR customer_email = $1)")
        .bind(&p.email)
        .fetch_one(&s.db)
        .await?;
    Ok(Json(PaginatedResponse { data: orders, total: total.0, page }))
}

pub async fn get_order(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<OrderDetail>, ApiError> {
    let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1")
        .bind(id)
        .fetch_optional(&s.db)
        .await?
        .ok_or(ApiError::NotFound)?;
    let items = sqlx::query_as::<_, OrderItem>("SELECT * FROM order_items WHERE order_id = $1")
        .bind(id)
        .fetch_all(&s.db)
        .await?;
    Ok(Json(OrderDetail { order, items }))
}
