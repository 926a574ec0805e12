//! Session cart handlers.
//!
//! Rows are keyed by (session, product); the response view is assembled
//! through the cart aggregate so subtotals and merges follow the domain
//! rules.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::domain::aggregates::cart::{Cart, CartItem};
use crate::domain::value_objects::Money;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, sqlx::FromRow)]
struct CartRow {
    product_id: Uuid,
    quantity: i32,
    name: String,
    sku: String,
    price: i64,
}

#[derive(Debug, Serialize)]
pub struct CartItemView {
    pub product_id: Uuid,
    pub name: String,
    pub sku: String,
    pub quantity: u32,
    pub unit_price: i64,
    pub line_total: i64,
}

#[derive(Debug, Serialize)]
pub struct CartView {
    pub session_id: String,
    pub items: Vec<CartItemView>,
    pub subtotal: i64,
    pub currency: String,
}

async fn load_cart(state: &AppState, session: &str) -> Result<Cart, ApiError> {
    let rows = sqlx::query_as::<_, CartRow>(
        "SELECT ci.product_id, ci.quantity, p.name, p.sku, p.price \
         FROM cart_items ci JOIN products p ON p.id = ci.product_id \
         WHERE ci.session_id = $1 AND p.status = 'active' \
         ORDER BY ci.created_at",
    )
    .bind(session)
    .fetch_all(&state.db)
    .await?;

    let currency = state.config.currency.clone();
    let mut cart = Cart::new(session, &currency);
    for row in rows {
        cart.add_item(CartItem {
            product_id: row.product_id,
            name: row.name,
            sku: row.sku,
            quantity: row.quantity.max(0) as u32,
            unit_price: Money::new(row.price, &currency),
        });
    }
    Ok(cart)
}

fn cart_view(cart: &Cart) -> CartView {
    CartView {
        session_id: cart.session_id().to_string(),
        items: cart
            .items()
            .iter()
            .map(|item| CartItemView {
                product_id: item.product_id,
                name: item.name.clone(),
                sku: item.sku.clone(),
                quantity: item.quantity,
                unit_price: item.unit_price.amount(),
                line_total: item.line_total().amount(),
            })
            .collect(),
        subtotal: cart.subtotal().amount(),
        currency: cart.subtotal().currency().to_string(),
    }
}

pub async fn get_cart(State(s): State<AppState>, Path(session): Path<String>) -> Result<Json<CartView>, ApiError> {
    let cart = load_cart(&s, &session).await?;
    Ok(Json(cart_view(&cart)))
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddToCartRequest {
    pub product_id: Uuid,
    #[validate(range(min = 1, max = 999))]
    pub quantity: i32,
}

pub async fn add_to_cart(
    State(s): State<AppState>,
    Path(session): Path<String>,
    Json(r): Json<AddToCartRequest>,
) -> Result<(StatusCode, Json<CartView>), ApiError> {
    r.validate()?;
    let exists: Option<(Uuid,)> =
        sqlx::query_as("SELECT id FROM products WHERE id = $1 AND status = 'active'")
            .bind(r.product_id)
            .fetch_optional(&s.db)
            .await?;
    if exists.is_none() {
        return Err(ApiError::NotFound);
    }
    sqlx::query(
        "INSERT INTO cart_items (id, session_id, product_id, quantity, created_at) \
         VALUES ($1, $2, $3, $4, NOW()) \
         ON CONFLICT (session_id, product_id) DO UPDATE SET quantity = cart_items.quantity + $4",
    )
    .bind(Uuid::now_v7())
    .bind(&session)
    .bind(r.product_id)
    .bind(r.quantity)
    .execute(&s.db)
    .await?;
    let cart = load_cart(&s, &session).await?;
    Ok((StatusCode::CREATED, Json(cart_view(&cart))))
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateCartItemRequest {
    #[validate(range(min = 0, max = 999))]
    pub quantity: i32,
}

pub async fn update_item(
    State(s): State<AppState>,
    Path((session, product_id)): Path<(String, Uuid)>,
    Json(r): Json<UpdateCartItemRequest>,
) -> Result<Json<CartView>, ApiError> {
    r.validate()?;
    let result = if r.quantity == 0 {
        sqlx::query("DELETE FROM cart_items WHERE session_id = $1 AND product_id = $2")
            .bind(&session)
            .bind(product_id)
            .execute(&s.db)
            .await?
    } else {
        sqlx::query("UPDATE cart_items SET quantity = $3 WHERE session_id = $1 AND product_id = $2")
            .bind(&session)
            .bind(product_id)
            .bind(r.quantity)
            .execute(&s.db)
            .await?
    };
    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound);
    }
    let cart = load_cart(&s, &session).await?;
    Ok(Json(cart_view(&cart)))
}

pub async fn remove_item(
    State(s): State<AppState>,
    Path((session, product_id)): Path<(String, Uuid)>,
) -> Result<Json<CartView>, ApiError> {
    let result = sqlx::query("DELETE FROM cart_items WHERE session_id = $1 AND product_id = $2")
        .bind(&session)
        .bind(product_id)
        .execute(&s.db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound);
    }
    let cart = load_cart(&s, &session).await?;
    Ok(Json(cart_view(&cart)))
}

pub async fn clear_cart(State(s): State<AppState>, Path(session): Path<String>) -> Result<StatusCode, ApiError> {
    sqlx::query("DELETE FROM cart_items WHERE session_id = $1")
        .bind(&session)
        .execute(&s.db)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
