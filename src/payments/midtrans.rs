//! Midtrans Snap client and webhook verification.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha512};

use super::{GatewayError, PaymentGateway, PaymentRequest, SnapTransaction};

pub struct MidtransGateway {
    http: reqwest::Client,
    base_url: String,
    server_key: String,
}

impl MidtransGateway {
    pub fn new(base_url: impl Into<String>, server_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            server_key: server_key.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SnapResponse {
    token: String,
    redirect_url: String,
}

#[async_trait]
impl PaymentGateway for MidtransGateway {
    async fn create_transaction(&self, request: &PaymentRequest) -> Result<SnapTransaction, GatewayError> {
        let body = json!({
            "transaction_details": {
                "order_id": request.order_number,
                "gross_amount": request.gross_amount,
            },
            "customer_details": {
                "email": request.customer_email,
            },
        });
        let response = self
            .http
            .post(format!("{}/snap/v1/transactions", self.base_url))
            .basic_auth(&self.server_key, Some(""))
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(GatewayError::Rejected(format!("{status}: {detail}")));
        }
        let snap: SnapResponse = response.json().await?;
        Ok(SnapTransaction { token: snap.token, redirect_url: snap.redirect_url })
    }
}

/// Asynchronous payment notification as posted by the provider.
#[derive(Clone, Debug, Deserialize)]
pub struct PaymentNotification {
    pub order_id: String,
    pub status_code: String,
    pub gross_amount: String,
    pub transaction_status: String,
    #[serde(default)]
    pub fraud_status: Option<String>,
    pub signature_key: String,
}

/// The provider signs notifications with
/// `sha512(order_id + status_code + gross_amount + server_key)`.
pub fn verify_signature(server_key: &str, notification: &PaymentNotification) -> bool {
    let mut hasher = Sha512::new();
    hasher.update(notification.order_id.as_bytes());
    hasher.update(notification.status_code.as_bytes());
    hasher.update(notification.gross_amount.as_bytes());
    hasher.update(server_key.as_bytes());
    hex::encode(hasher.finalize()) == notification.signature_key.to_lowercase()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PaymentOutcome {
    Paid,
    Failed,
    Pending,
}

impl PaymentOutcome {
    /// Collapses the provider's transaction/fraud status pair into the
    /// order-level outcome.
    pub fn of(notification: &PaymentNotification) -> Self {
        match notification.transaction_status.as_str() {
            "settlement" => Self::Paid,
            "capture" => match notification.fraud_status.as_deref() {
                Some("challenge") => Self::Pending,
                _ => Self::Paid,
            },
            "deny" | "cancel" | "expire" | "failure" => Self::Failed,
            _ => Self::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notification(signature: &str) -> PaymentNotification {
        PaymentNotification {
            order_id: "ORD-00012345".into(),
            status_code: "200".into(),
            gross_amount: "15000".into(),
            transaction_status: "settlement".into(),
            fraud_status: None,
            signature_key: signature.into(),
        }
    }

    #[test]
    fn test_signature_verification() {
        // sha512("ORD-00012345" + "200" + "15000" + "server-key-test")
        let valid = "89d723358ee2f3bf3d8f399258c9a77ef423cd02a830b6b30ba9bfad2f321412f42adb85964fa6ca421abdf65879b8211c10d0ed0ac144fb5d9bd8bccec8f828";
        assert!(verify_signature("server-key-test", &notification(valid)));
        assert!(!verify_signature("server-key-test", &notification("deadbeef")));
        assert!(!verify_signature("another-key", &notification(valid)));
    }

    #[test]
    fn test_outcome_mapping() {
        let mut n = notification("x");
        assert_eq!(PaymentOutcome::of(&n), PaymentOutcome::Paid);

        n.transaction_status = "capture".into();
        n.fraud_status = Some("accept".into());
        assert_eq!(PaymentOutcome::of(&n), PaymentOutcome::Paid);

        n.fraud_status = Some("challenge".into());
        assert_eq!(PaymentOutcome::of(&n), PaymentOutcome::Pending);

        for status in ["deny", "cancel", "expire", "failure"] {
            n.transaction_status = status.into();
            n.fraud_status = None;
            assert_eq!(PaymentOutcome::of(&n), PaymentOutcome::Failed);
        }

        n.transaction_status = "pending".into();
        assert_eq!(PaymentOutcome::of(&n), PaymentOutcome::Pending);
    }
}
