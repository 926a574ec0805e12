//! Payment gateway integration.
//!
//! The gateway is an external HTTP service. Checkout asks it for a hosted
//! payment transaction; the provider later reports the outcome to the
//! webhook route. Everything provider-specific lives behind
//! [`PaymentGateway`] so handlers and tests never touch the wire.

pub mod midtrans;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

pub use midtrans::{verify_signature, MidtransGateway, PaymentNotification, PaymentOutcome};

#[derive(Clone, Debug, Serialize)]
pub struct PaymentRequest {
    pub order_number: String,
    pub gross_amount: i64,
    pub customer_email: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct SnapTransaction {
    pub token: String,
    pub redirect_url: String,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("gateway rejected transaction: {0}")]
    Rejected(String),
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_transaction(&self, request: &PaymentRequest) -> Result<SnapTransaction, GatewayError>;
}
