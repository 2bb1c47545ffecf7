use std::sync::Arc;

use rental_core::config::Config;
use rental_core::notifications::LogNotifier;
use rental_core::payments::PaymentGatewayKind;
use rental_core::store::PgRentalStore;
use rental_core::{create_router, db, AppState};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing subscriber for logging, RUST_LOG overrides the level
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_level(true)
        .init();

    tracing::info!("Rental core - Starting...");

    let config = Config::from_env()?;

    tracing::info!("Connecting to database...");
    let pool = db::create_pool(&config.database_url, config.database_max_connections).await?;
    db::run_migrations(&pool).await?;

    if config.payment_gateway == PaymentGatewayKind::InMemory {
        tracing::warn!("PAYMENT_GATEWAY=in_memory: payments are simulated and no money moves");
    }
    tracing::info!(gateway = ?config.payment_gateway, "Payment gateway selected");

    let state = AppState::new(
        Arc::new(PgRentalStore::new(pool)),
        config.payment_gateway.build(),
        Arc::new(LogNotifier),
    );
    let app = create_router(state);

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Rental core is running on http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
