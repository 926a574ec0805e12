//! Domain events
//!
//! Raised by the aggregates and published on the message bus for
//! downstream consumers (fulfilment, notifications).

use crate::domain::value_objects::Sku;
use serde::Serialize;
use uuid::Uuid;

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DomainEvent {
    Product(ProductEvent),
    Order(OrderEvent),
}

impl DomainEvent {
    /// Message-bus subject the event is published on.
    pub fn subject(&self) -> &'static str {
        match self {
            Self::Product(_) => "storefront.products",
            Self::Order(_) => "storefront.orders",
        }
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProductEvent {
    Created { product_id: Uuid, sku: Sku },
    Published { product_id: Uuid },
    Archived { product_id: Uuid },
    InventoryAdjusted { product_id: Uuid, quantity: u32 },
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OrderEvent {
    Created { order_id: Uuid, order_number: String, total: i64 },
    Paid { order_number: String },
    PaymentFailed { order_number: String },
    Cancelled { order_id: Uuid },
}
