//! User model
//!
//! Users are owned by the account service; this crate only reads them to
//! resolve authenticated sessions and to check login credentials.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Identifier of a user row
pub type UserId = i64;

/// User entity
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub provider: String,
    pub created_at: DateTime<Utc>,
}
