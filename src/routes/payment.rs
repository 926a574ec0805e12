//! Payment notification webhook and redirect landing handlers.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::domain::aggregates::order::{OrderStatus, PaymentStatus};
use crate::domain::events::{DomainEvent, OrderEvent};
use crate::error::ApiError;
use crate::payments::{verify_signature, PaymentNotification, PaymentOutcome};
use crate::state::AppState;

/// Provider-to-merchant notification. Always answers 200 for states we do
/// not act on, so the provider stops retrying; a bad signature is the one
/// hard rejection.
pub async fn webhook(
    State(s): State<AppState>,
    Json(n): Json<PaymentNotification>,
) -> Result<StatusCode, ApiError> {
    if !verify_signature(&s.config.midtrans_server_key, &n) {
        warn!(order = %n.order_id, "rejecting payment notification with bad signature");
        return Err(ApiError::Forbidden);
    }

    let (payment, status, event) = match PaymentOutcome::of(&n) {
        PaymentOutcome::Paid => (
            PaymentStatus::Paid,
            OrderStatus::Processing,
            Some(DomainEvent::Order(OrderEvent::Paid { order_number: n.order_id.clone() })),
        ),
        PaymentOutcome::Failed => (
            PaymentStatus::Failed,
            OrderStatus::Cancelled,
            Some(DomainEvent::Order(OrderEvent::PaymentFailed { order_number: n.order_id.clone() })),
        ),
        PaymentOutcome::Pending => return Ok(StatusCode::OK),
    };

    let updated = sqlx::query(
        "UPDATE orders SET payment_status = $2, status = $3, updated_at = NOW() WHERE order_number = $1",
    )
    .bind(&n.order_id)
    .bind(payment.as_str())
    .bind(status.as_str())
    .execute(&s.db)
    .await?;

    if updated.rows_affected() == 0 {
        warn!(order = %n.order_id, "payment notification for unknown order");
    } else {
        info!(order = %n.order_id, payment = payment.as_str(), "order payment updated");
        if let Some(event) = event {
            s.publish_event(&event).await;
        }
    }
    Ok(StatusCode::OK)
}

#[derive(Debug, Deserialize)]
pub struct OrderRef {
    pub order_id: Option<String>,
}

#[derive(Debug, sqlx::FromRow)]
struct OrderSummary {
    order_number: String,
    status: String,
    payment_status: String,
    total: i64,
    currency: String,
}

async fn summary_for(s: &AppState, order_number: &str) -> Result<Option<OrderSummary>, ApiError> {
    let summary = sqlx::query_as::<_, OrderSummary>(
        "SELECT order_number, status, payment_status, total, currency FROM orders WHERE order_number = $1",
    )
    .bind(order_number)
    .fetch_optional(&s.db)
    .await?;
    Ok(summary)
}

fn summary_json(summary: OrderSummary) -> serde_json::Value {
    json!({
        "order_number": summary.order_number,
        "status": summary.status,
        "payment_status": summary.payment_status,
        "total": summary.total,
        "currency": summary.currency,
    })
}

/// Landing page for the provider's success redirect.
pub async fn payment_success(State(s): State<AppState>, Query(q): Query<OrderRef>) -> Result<Json<serde_json::Value>, ApiError> {
    let order_number = q.order_id.ok_or(ApiError::NotFound)?;
    let summary = summary_for(&s, &order_number).await?.ok_or(ApiError::NotFound)?;
    Ok(Json(json!({ "result": "success", "order": summary_json(summary) })))
}

/// Landing page for the provider's generic finish redirect; the payment may
/// still be settling.
pub async fn finish_payment(State(s): State<AppState>, Query(q): Query<OrderRef>) -> Result<Json<serde_json::Value>, ApiError> {
    let Some(order_number) = q.order_id else {
        return Ok(Json(json!({ "result": "finished" })));
    };
    match summary_for(&s, &order_number).await? {
        Some(summary) => Ok(Json(json!({ "result": "finished", "order": summary_json(summary) }))),
        None => Err(ApiError::NotFound),
    }
}

/// Landing page for the provider's error redirect.
pub async fn payment_error(State(s): State<AppState>, Query(q): Query<OrderRef>) -> Result<Json<serde_json::Value>, ApiError> {
    let order = match q.order_id {
        Some(order_number) => summary_for(&s, &order_number).await?.map(summary_json),
        None => None,
    };
    Ok(Json(json!({
        "result": "error",
        "message": "The payment could not be completed. No charge was made.",
        "order": order,
    })))
}
