//! Checkout handler.
//!
//! Builds the order through the order aggregate from the session cart,
//! persists it with inventory reservation in one transaction, then asks the
//! payment gateway for a hosted transaction.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::domain::aggregates::order::{LineItem, Order};
use crate::domain::value_objects::Money;
use crate::error::ApiError;
use crate::payments::PaymentRequest;
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct CheckoutRequest {
    #[validate(length(min = 1))]
    pub session_id: String,
    #[validate(email)]
    pub customer_email: String,
    #[serde(default)]
    pub shipping_address: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub order_id: Uuid,
    pub order_number: String,
    pub subtotal: i64,
    pub shipping: i64,
    pub total: i64,
    pub currency: String,
    pub payment_token: String,
    pub payment_redirect_url: String,
}

#[derive(Debug, sqlx::FromRow)]
struct CheckoutRow {
    product_id: Uuid,
    quantity: i32,
    name: String,
    sku: String,
    price: i64,
}

pub async fn checkout(
    State(s): State<AppState>,
    Json(r): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<CheckoutResponse>), ApiError> {
    r.validate()?;

    let rows = sqlx::query_as::<_, CheckoutRow>(
        "SELECT ci.product_id, ci.quantity, p.name, p.sku, p.price \
         FROM cart_items ci JOIN products p ON p.id = ci.product_id \
         WHERE ci.session_id = $1 AND p.status = 'active' \
         ORDER BY ci.created_at",
    )
    .bind(&r.session_id)
    .fetch_all(&s.db)
    .await?;

    let currency = s.config.currency.clone();
    let order_number = format!("ORD-{:08}", rand::random::<u32>() % 100_000_000);
    let mut order = Order::create(&order_number, &r.customer_email, &currency);
    for row in &rows {
        order.add_item(LineItem {
            product_id: row.product_id,
            name: row.name.clone(),
            sku: row.sku.clone(),
            quantity: row.quantity.max(0) as u32,
            unit_price: Money::new(row.price, &currency),
        });
    }
    order.set_shipping(Money::new(s.config.shipping_flat, &currency));
    order
        .confirm()
        .map_err(|_| ApiError::Conflict("cart is empty".to_string()))?;

    let mut tx = s.db.begin().await?;
    for item in order.items() {
        let reserved = sqlx::query(
            "UPDATE products SET inventory_quantity = inventory_quantity - $2, updated_at = NOW() \
             WHERE id = $1 AND inventory_quantity >= $2",
        )
        .bind(item.product_id)
        .bind(item.quantity as i32)
        .execute(&mut *tx)
        .await?;
        if reserved.rows_affected() == 0 {
            return Err(ApiError::Conflict(format!("insufficient inventory for {}", item.sku)));
        }
    }
    sqlx::query(
        "INSERT INTO orders (id, order_number, customer_email, status, payment_status, \
         subtotal, shipping, total, currency, shipping_address, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NOW(), NOW())",
    )
    .bind(order.id())
    .bind(order.order_number())
    .bind(order.customer_email())
    .bind(order.status().as_str())
    .bind(order.payment().as_str())
    .bind(order.subtotal().amount())
    .bind(order.shipping().amount())
    .bind(order.total().amount())
    .bind(&currency)
    .bind(&r.shipping_address)
    .execute(&mut *tx)
    .await?;
    for item in order.items() {
        sqlx::query(
            "INSERT INTO order_items (id, order_id, product_id, sku, name, quantity, unit_price, total) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(Uuid::now_v7())
        .bind(order.id())
        .bind(item.product_id)
        .bind(&item.sku)
        .bind(&item.name)
        .bind(item.quantity as i32)
        .bind(item.unit_price.amount())
        .bind(item.total().amount())
        .execute(&mut *tx)
        .await?;
    }
    sqlx::query("DELETE FROM cart_items WHERE session_id = $1")
        .bind(&r.session_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    for event in order.take_events() {
        s.publish_event(&event).await;
    }

    let payment = s
        .payments
        .create_transaction(&PaymentRequest {
            order_number: order.order_number().to_string(),
            gross_amount: order.total().amount(),
            customer_email: order.customer_email().to_string(),
        })
        .await
        .map_err(|err| ApiError::Payment(err.to_string()))?;

    sqlx::query("UPDATE orders SET payment_token = $2, payment_redirect_url = $3, updated_at = NOW() WHERE id = $1")
        .bind(order.id())
        .bind(&payment.token)
        .bind(&payment.redirect_url)
        .execute(&s.db)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CheckoutResponse {
            order_id: order.id(),
            order_number: order.order_number().to_string(),
            subtotal: order.subtotal().amount(),
            shipping: order.shipping().amount(),
            total: order.total().amount(),
            currency,
            payment_token: payment.token,
            payment_redirect_url: payment.redirect_url,
        }),
    ))
}
