//! Environment-backed configuration, read once at startup.

use anyhow::{Context, Result};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub nats_url: Option<String>,
    /// Subject carrying maintenance-settings change notifications.
    pub maintenance_subject: String,
    pub currency: String,
    /// Flat shipping charge in minor units added to every order.
    pub shipping_flat: i64,
    pub midtrans_base_url: String,
    pub midtrans_server_key: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is required")?;
        let port = std::env::var("PORT")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(8083);
        let shipping_flat = std::env::var("SHIPPING_FLAT")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(0);
        Ok(Self {
            port,
            database_url,
            nats_url: std::env::var("NATS_URL").ok(),
            maintenance_subject: std::env::var("MAINTENANCE_SUBJECT")
                .unwrap_or_else(|_| "storefront.maintenance.changed".to_string()),
            currency: std::env::var("CURRENCY").unwrap_or_else(|_| "IDR".to_string()),
            shipping_flat,
            midtrans_base_url: std::env::var("MIDTRANS_BASE_URL")
                .unwrap_or_else(|_| "https://app.sandbox.midtrans.com".to_string()),
            midtrans_server_key: std::env::var("MIDTRANS_SERVER_KEY").unwrap_or_default(),
        })
    }
}
