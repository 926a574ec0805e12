//! Storefront - Self-hosted E-commerce Storefront

use std::sync::Arc;

use anyhow::Result;
use axum::middleware;
use sqlx::postgres::PgPoolOptions;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use storefront::gate::enforce::maintenance_gate;
use storefront::gate::settings::{NatsChangeFeed, PgSettingsFetcher, SettingsStore};
use storefront::payments::{MidtransGateway, PaymentGateway};
use storefront::{routes, AppConfig, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;
    let db = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;
    sqlx::migrate!("./migrations").run(&db).await?;

    let nats = match &config.nats_url {
        Some(url) => match async_nats::connect(url).await {
            Ok(client) => Some(client),
            Err(err) => {
                warn!(%err, "NATS unreachable, continuing without change notifications");
                None
            }
        },
        None => None,
    };

    let maintenance = Arc::new(SettingsStore::new(Arc::new(PgSettingsFetcher::new(db.clone()))));
    maintenance.load().await;

    // Keep the subscription guard alive for the life of the server; settings
    // changes from other instances invalidate the local cache through it.
    let _maintenance_subscription = match &nats {
        Some(client) => match NatsChangeFeed::subscribe(client, &config.maintenance_subject).await {
            Ok(feed) => Some(maintenance.clone().subscribe(Box::new(feed), |settings| {
                info!(enabled = settings.enabled, "maintenance settings changed");
            })),
            Err(err) => {
                warn!(%err, "maintenance change subscription failed, serving cached settings");
                None
            }
        },
        None => None,
    };

    let payments: Arc<dyn PaymentGateway> = Arc::new(MidtransGateway::new(
        config.midtrans_base_url.clone(),
        config.midtrans_server_key.clone(),
    ));

    let state = AppState {
        db,
        nats,
        config: config.clone(),
        maintenance: maintenance.clone(),
        payments,
    };

    let app = routes::router(state)
        .layer(middleware::from_fn_with_state(maintenance, maintenance_gate))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = format!("0.0.0.0:{}", config.port);
    info!("storefront listening on {addr}");
    axum::serve(tokio::net::TcpListener::bind(&addr).await?, app).await?;
    Ok(())
}
