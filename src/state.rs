//! Shared application state.

use std::sync::Arc;

use tracing::warn;

use crate::config::AppConfig;
use crate::domain::events::DomainEvent;
use crate::gate::settings::SettingsStore;
use crate::payments::PaymentGateway;

#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub nats: Option<async_nats::Client>,
    pub config: AppConfig,
    pub maintenance: Arc<SettingsStore>,
    pub payments: Arc<dyn PaymentGateway>,
}

impl AppState {
    /// Best-effort event publication. The bus is optional; a publish
    /// failure is logged and never fails the request.
    pub async fn publish_event(&self, event: &DomainEvent) {
        let Some(client) = &self.nats else { return };
        let payload = match serde_json::to_vec(event) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(%err, "failed to encode domain event");
                return;
            }
        };
        if let Err(err) = client.publish(event.subject().to_string(), payload.into()).await {
            warn!(%err, subject = event.subject(), "failed to publish domain event");
        }
    }

    /// Notifies other instances that the maintenance settings changed, and
    /// invalidates the local cache immediately.
    pub async fn broadcast_maintenance_change(&self) {
        self.maintenance.invalidate();
        let Some(client) = &self.nats else { return };
        if let Err(err) = client
            .publish(self.config.maintenance_subject.clone(), "{}".into())
            .await
        {
            warn!(%err, "failed to publish maintenance change notification");
        }
    }
}
