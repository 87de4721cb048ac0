//! Session and verification-code lifecycle manager for the carrier marketplace
//!
//! Issues signed access and refresh tokens backed by session rows, validates
//! presented tokens against those rows on every request, and runs the
//! verification code flow used by signup and password reset.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use carrier_auth::{
//!     AppState, clock::SystemClock, config::AuthConfig,
//!     repositories::{MemorySessionStore, MemoryUserDirectory, MemoryVerificationCodeStore},
//!     routes::create_router, service::AuthService, verification::LogNotifier,
//! };
//!
//! async fn example_usage() -> anyhow::Result<()> {
//!     let config = AuthConfig::from_env()?;
//!     let auth = AuthService::new(
//!         config.jwt,
//!         config.verification,
//!         Arc::new(MemorySessionStore::new()),
//!         Arc::new(MemoryVerificationCodeStore::new()),
//!         Arc::new(MemoryUserDirectory::new()),
//!         Arc::new(LogNotifier),
//!         Arc::new(SystemClock),
//!     );
//!
//!     let app = create_router(AppState::new(auth));
//!     let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

pub mod clock;
pub mod config;
pub mod error;
pub mod jwt;
pub mod middleware;
pub mod models;
pub mod rate_limiter;
pub mod repositories;
pub mod routes;
pub mod service;
pub mod session;
pub mod sweeper;
pub mod validation;
pub mod validator;
pub mod verification;

use crate::service::AuthService;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthService>,
}

impl AppState {
    pub fn new(auth: AuthService) -> Self {
        Self {
            auth: Arc::new(auth),
        }
    }
}
