//! Service configuration
//!
//! Everything is read from the environment once at startup and handed to the
//! components that need it. Missing token secrets or TTLs abort startup.

use anyhow::Result;
use std::str::FromStr;

use crate::{jwt::JwtConfig, verification::VerificationConfig};

/// Top-level configuration for the authentication service
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwt: JwtConfig,
    pub verification: VerificationConfig,
    /// Cron expression for background session compaction, disabled when unset
    pub sweep_schedule: Option<String>,
    /// Address the HTTP server binds to
    pub bind_address: String,
}

impl AuthConfig {
    /// Create a new AuthConfig from environment variables
    ///
    /// # Environment Variables
    /// - see [`JwtConfig::from_env`] and [`VerificationConfig::from_env`]
    /// - `SESSION_SWEEP_SCHEDULE`: cron schedule for background compaction (default: disabled)
    /// - `AUTH_BIND_ADDRESS`: listen address (default: "0.0.0.0:3000")
    pub fn from_env() -> Result<Self> {
        let sweep_schedule = std::env::var("SESSION_SWEEP_SCHEDULE")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let bind_address =
            std::env::var("AUTH_BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());

        Ok(AuthConfig {
            jwt: JwtConfig::from_env()?,
            verification: VerificationConfig::from_env(),
            sweep_schedule,
            bind_address,
        })
    }
}

/// Read a variable that must be present and non-empty
pub(crate) fn required_var(name: &str) -> Result<String> {
    let value = std::env::var(name)
        .map_err(|_| anyhow::anyhow!("{} environment variable not set", name))?;

    if value.trim().is_empty() {
        anyhow::bail!("{} environment variable is empty", name);
    }

    Ok(value)
}

/// Read an optional variable, falling back to `default` when unset or unparsable
pub(crate) fn parse_or_default<T: FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}
