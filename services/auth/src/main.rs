use anyhow::Result;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use carrier_auth::{
    AppState,
    clock::{Clock, SystemClock},
    config::AuthConfig,
    repositories::{PgSessionStore, PgVerificationCodeStore, SessionStore, UserRepository},
    routes,
    service::AuthService,
    sweeper,
    verification::LogNotifier,
};
use common::database;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting authentication service");

    let config = AuthConfig::from_env()?;

    // Initialize database connection pool
    let db_config = database::DatabaseConfig::from_env()?;
    let pool = database::init_pool(&db_config).await?;

    // Check database connectivity
    if database::health_check(&pool).await? {
        info!("Database connection successful");
    } else {
        anyhow::bail!("Failed to connect to database");
    }

    database::migrate(&pool).await?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let session_store: Arc<dyn SessionStore> = Arc::new(PgSessionStore::new(pool.clone()));

    let auth = AuthService::new(
        config.jwt,
        config.verification,
        session_store.clone(),
        Arc::new(PgVerificationCodeStore::new(pool.clone())),
        Arc::new(UserRepository::new(pool)),
        Arc::new(LogNotifier),
        clock.clone(),
    );

    let mut scheduler = match &config.sweep_schedule {
        Some(schedule) => {
            Some(sweeper::start_session_sweeper(session_store, clock, schedule).await?)
        }
        None => None,
    };

    info!("Authentication service initialized successfully");

    // Start the web server
    let app = routes::create_router(AppState::new(auth));

    let listener = TcpListener::bind(&config.bind_address).await?;
    info!("Authentication service listening on {}", config.bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down authentication service");
        })
        .await?;

    if let Some(scheduler) = scheduler.as_mut() {
        scheduler.shutdown().await?;
    }

    Ok(())
}
