use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use stk_relay::config::AppConfig;
use stk_relay::database::{InMemoryPaymentStore, MongoPaymentStore, PaymentStore};
use stk_relay::{build_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,stk_relay=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env().context("Failed to load configuration")?;
    tracing::info!(config = %config.get_config_info(), "Configuration loaded");

    let store = initialize_store(&config).await?;
    let app_state = AppState::new(&config, store)?;

    // Surface bad credentials at boot rather than on the first payment.
    match app_state.mpesa_service.get_access_token().await {
        Ok(_) => tracing::info!("M-Pesa credentials verified"),
        Err(e) => tracing::warn!(error = %e, "M-Pesa token check failed; initiation will retry per request"),
    }

    let app = build_router(app_state);
    start_server(app, &config).await
}

async fn initialize_store(config: &AppConfig) -> anyhow::Result<Arc<dyn PaymentStore>> {
    match &config.database {
        Some(database) => {
            let store = MongoPaymentStore::connect(database)
                .await
                .context("Failed to connect to MongoDB")?;
            Ok(Arc::new(store))
        }
        None => {
            tracing::warn!("DATABASE_URL not set; payments are kept in memory and lost on restart");
            Ok(Arc::new(InMemoryPaymentStore::new()))
        }
    }
}

async fn start_server(app: axum::Router, config: &AppConfig) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("HOST/PORT do not form a socket address")?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutting down");
}
