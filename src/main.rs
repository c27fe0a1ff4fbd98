//! Offers Directory Server - Main Application Entry Point
//!
//! # Architecture
//!
//! - **Web Framework**: Axum (async HTTP server)
//! - **Database**: PostgreSQL with sqlx (async queries)
//! - **Authentication**: HS256 JWT bearer tokens with a user/admin role claim
//! - **Payments**: PayHere hosted checkout and recurring billing
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment variables
//! 2. Create database connection pool and run migrations
//! 3. Create or refresh the bootstrap admin, if configured
//! 4. Spawn the subscription lifecycle worker
//! 5. Build the router and start serving on the configured port

use offers_directory_server::{app, config, db, services, state::AppState};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Reads RUST_LOG, defaults to "info"
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = config::Config::from_env()?;
    tracing::info!("Configuration loaded");

    let pool = db::create_pool(&config.database_url).await?;
    tracing::info!("Database pool created");

    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations complete");

    if let Some((email, password)) = config.admin_bootstrap() {
        services::user_service::ensure_admin(&pool, email, password, config.bcrypt_cost).await?;
        tracing::info!(%email, "Bootstrap admin ready");
    }

    let addr = format!("0.0.0.0:{}", config.server_port);
    let state = AppState::new(pool, config)?;

    tokio::spawn(services::lifecycle::run_worker(
        state.pool.clone(),
        state.payhere.clone(),
        state.config.clone(),
    ));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app::router(state)).await?;

    Ok(())
}
