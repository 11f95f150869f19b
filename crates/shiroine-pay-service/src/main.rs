//! Shiroine Pay Service - premium purchases for the Shiroine bot
//!
//! This is the main entry point for the payment service.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shiroine_pay_service::rate_limit::spawn_pruning;
use shiroine_pay_service::{create_router, AppState, ServiceConfig};
use shiroine_pay_store::{MemoryStore, PgStore, Store};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A missing .env file is fine; the environment may already be set
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,shiroine_pay=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Shiroine Pay Service");

    let config = ServiceConfig::from_env();

    tracing::info!(
        listen_addr = %config.listen_addr,
        gateway = %config.payment_gateway,
        domain = %config.domain,
        database_configured = %config.database.is_some(),
        "Service configuration loaded"
    );

    let store: Arc<dyn Store> = match &config.database {
        Some(database) => {
            tracing::info!("Connecting to PostgreSQL");
            let store = PgStore::connect_with(database.connect_options()?).await?;
            store.bootstrap().await?;
            Arc::new(store)
        }
        None => {
            tracing::warn!(
                "No database configured - using in-memory store, payments will not survive a restart"
            );
            Arc::new(MemoryStore::new())
        }
    };

    let state = AppState::new(store, config.clone())?;
    spawn_pruning(state.rate_limiter.clone(), Duration::from_secs(60));

    let app = create_router(state);
    tracing::info!("Router configured with all API endpoints");

    tracing::info!(listen_addr = %config.listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
