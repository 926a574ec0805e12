//! Order Aggregate

use chrono::{DateTime, Utc};
use uuid::Uuid;
use crate::domain::value_objects::Money;
use crate::domain::events::{DomainEvent, OrderEvent};

#[derive(Clone, Debug)]
pub struct Order {
    id: Uuid,
    order_number: String,
    customer_email: String,
    status: OrderStatus,
    payment: PaymentStatus,
    items: Vec<LineItem>,
    subtotal: Money,
    shipping: Money,
    total: Money,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    events: Vec<DomainEvent>,
}

#[derive(Clone, Debug)]
pub struct LineItem {
    pub product_id: Uuid,
    pub name: String,
    pub sku: String,
    pub quantity: u32,
    pub unit_price: Money,
}

impl LineItem {
    pub fn total(&self) -> Money { self.unit_price.multiply(self.quantity) }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OrderStatus { #[default] Pending, Processing, Shipped, Delivered, Cancelled }

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "shipped" => Some(Self::Shipped),
            "delivered" => Some(Self::Delivered),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PaymentStatus { #[default] Pending, Paid, Failed, Refunded }

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Failed => "failed",
            Self::Refunded => "refunded",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(Self::Pending),
            "paid" => Some(Self::Paid),
            "failed" => Some(Self::Failed),
            "refunded" => Some(Self::Refunded),
            _ => None,
        }
    }
}

impl Order {
    pub fn create(order_number: impl Into<String>, customer_email: impl Into<String>, currency: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(), order_number: order_number.into(), customer_email: customer_email.into(),
            status: OrderStatus::Pending, payment: PaymentStatus::Pending,
            items: vec![], subtotal: Money::zero(currency), shipping: Money::zero(currency),
            total: Money::zero(currency), created_at: now, updated_at: now, events: vec![],
        }
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn order_number(&self) -> &str { &self.order_number }
    pub fn customer_email(&self) -> &str { &self.customer_email }
    pub fn status(&self) -> OrderStatus { self.status }
    pub fn payment(&self) -> PaymentStatus { self.payment }
    pub fn items(&self) -> &[LineItem] { &self.items }
    pub fn subtotal(&self) -> &Money { &self.subtotal }
    pub fn shipping(&self) -> &Money { &self.shipping }
    pub fn total(&self) -> &Money { &self.total }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }

    pub fn add_item(&mut self, item: LineItem) { self.items.push(item); self.recalculate(); }

    pub fn set_shipping(&mut self, shipping: Money) {
        self.shipping = shipping;
        self.recalculate();
    }

    pub fn confirm(&mut self) -> Result<(), OrderError> {
        if self.items.is_empty() { return Err(OrderError::NoItems); }
        self.raise_event(DomainEvent::Order(OrderEvent::Created {
            order_id: self.id,
            order_number: self.order_number.clone(),
            total: self.total.amount(),
        }));
        Ok(())
    }

    pub fn mark_paid(&mut self) {
        self.payment = PaymentStatus::Paid;
        self.status = OrderStatus::Processing;
        self.touch();
        self.raise_event(DomainEvent::Order(OrderEvent::Paid { order_number: self.order_number.clone() }));
    }

    pub fn fail_payment(&mut self) {
        self.payment = PaymentStatus::Failed;
        self.status = OrderStatus::Cancelled;
        self.touch();
        self.raise_event(DomainEvent::Order(OrderEvent::PaymentFailed { order_number: self.order_number.clone() }));
    }

    pub fn cancel(&mut self) -> Result<(), OrderError> {
        if self.status == OrderStatus::Delivered { return Err(OrderError::CannotCancel); }
        self.status = OrderStatus::Cancelled;
        self.touch();
        self.raise_event(DomainEvent::Order(OrderEvent::Cancelled { order_id: self.id }));
        Ok(())
    }

    fn recalculate(&mut self) {
        self.subtotal = self.items.iter().fold(Money::zero(self.subtotal.currency()), |acc, i| acc.add(&i.total()).unwrap_or(acc));
        self.total = self.subtotal.add(&self.shipping).unwrap_or_else(|_| self.subtotal.clone());
        self.touch();
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone)] pub enum OrderError { NoItems, CannotCancel }
impl std::error::Error for OrderError {}
impl std::fmt::Display for OrderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self { Self::NoItems => write!(f, "No items"), Self::CannotCancel => write!(f, "Cannot cancel") }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(price: i64, quantity: u32) -> LineItem {
        LineItem { product_id: Uuid::new_v4(), name: "Widget".into(), sku: "W001".into(), quantity, unit_price: Money::idr(price) }
    }

    #[test]
    fn test_order_workflow() {
        let mut order = Order::create("ORD-00001001", "test@example.com", "IDR");
        order.add_item(line(10_000, 2));
        order.set_shipping(Money::idr(5_000));
        assert_eq!(order.subtotal().amount(), 20_000);
        assert_eq!(order.total().amount(), 25_000);
        order.confirm().unwrap();
        order.mark_paid();
        assert_eq!(order.status(), OrderStatus::Processing);
        assert_eq!(order.payment(), PaymentStatus::Paid);
    }

    #[test]
    fn test_empty_order_cannot_confirm() {
        let mut order = Order::create("ORD-00001002", "test@example.com", "IDR");
        assert!(order.confirm().is_err());
    }

    #[test]
    fn test_failed_payment_cancels() {
        let mut order = Order::create("ORD-00001003", "test@example.com", "IDR");
        order.add_item(line(10_000, 1));
        order.confirm().unwrap();
        order.fail_payment();
        assert_eq!(order.status(), OrderStatus::Cancelled);
        assert_eq!(order.payment(), PaymentStatus::Failed);
    }

    #[test]
    fn test_cancel_rules() {
        let mut order = Order::create("ORD-00001004", "test@example.com", "IDR");
        order.add_item(line(10_000, 1));
        order.cancel().unwrap();
        assert_eq!(order.status(), OrderStatus::Cancelled);
        let events = order.take_events();
        assert!(!events.is_empty());
    }

    #[test]
    fn test_status_round_trip() {
        assert_eq!(OrderStatus::parse("processing"), Some(OrderStatus::Processing));
        assert_eq!(OrderStatus::Processing.as_str(), "processing");
        assert_eq!(PaymentStatus::parse("paid"), Some(PaymentStatus::Paid));
        assert_eq!(PaymentStatus::parse("bogus"), None);
    }
}
