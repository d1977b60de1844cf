//! Domain Diagnostics API Server - Main Application Entry Point
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment variables
//! 2. Create database connection pool and run migrations (or fall back to
//!    in-memory stores when `DATABASE_URL` is unset)
//! 3. Build lookup providers and application state
//! 4. Start the schedule runner and the maintenance loop
//! 5. Build HTTP router and start server on configured port

use std::net::SocketAddr;

use tracing_subscriber::EnvFilter;

use domain_diagnostics_server::{
    config::Config,
    db,
    providers::ProviderRegistry,
    router,
    services::{maintenance, schedule_service},
    state::AppState,
    store::Stores,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging with tracing subscriber. Reads RUST_LOG environment variable (defaults to "info" level)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!("Configuration loaded");

    if config.api_key_pepper.is_empty() {
        tracing::warn!("API_KEY_PEPPER is empty; key digests are unpeppered");
    }

    let stores = match config.database_url.as_deref() {
        Some(url) => {
            let pool = db::create_pool(url, config.database_max_connections).await?;
            tracing::info!("Database pool created");

            db::run_migrations(&pool).await?;
            tracing::info!("Database migrations complete");

            Stores::postgres(pool)
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using in-memory stores, state is lost on restart");
            Stores::in_memory()
        }
    };

    let providers = ProviderRegistry::standard(&config);
    let port = config.server_port;
    let state = AppState::new(config, stores, providers);

    // Background work
    let _scheduler = schedule_service::spawn_scheduler(state.clone());
    let _maintenance = maintenance::spawn_maintenance(state.clone());

    let app = router(state);

    // Bind to network address and start server
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    // Peer addresses feed the client IP recorded in history
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
