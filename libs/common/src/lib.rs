//! Common library for the Jim Carrier backend
//!
//! This crate provides shared infrastructure used by the services: PostgreSQL
//! connectivity, the auth schema bootstrap and database error types.

pub mod database;
pub mod error;

/// Example usage of the database module
///
/// ```rust,no_run
/// use common::database::{DatabaseConfig, health_check, init_pool, migrate};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = DatabaseConfig::from_env()?;
///     let pool = init_pool(&config).await?;
///     migrate(&pool).await?;
///     println!("Database health check: {}", health_check(&pool).await?);
///     Ok(())
/// }
/// ```
pub fn example_usage() {}
