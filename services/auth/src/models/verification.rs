//! Verification code model and related functionality

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Purpose a verification code was issued for
///
/// Stored as `SMALLINT`: signup = 0, forget password = 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[repr(i16)]
#[serde(rename_all = "camelCase")]
pub enum RequestType {
    Signup = 0,
    ForgetPassword = 1,
}

impl RequestType {
    /// Human-readable label used in notification subjects
    pub fn label(&self) -> &'static str {
        match self {
            RequestType::Signup => "Signup",
            RequestType::ForgetPassword => "Password Reset",
        }
    }
}

/// Lifecycle state of a verification code
///
/// Stored as `SMALLINT`: waiting = 0, complete = 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[repr(i16)]
#[serde(rename_all = "lowercase")]
pub enum CodeStatus {
    Waiting = 0,
    Complete = 1,
}

/// Verification code row
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct VerificationCode {
    pub id: i64,
    pub email: String,
    pub code: String,
    pub request_type: RequestType,
    pub status: CodeStatus,
    pub created_at: DateTime<Utc>,
}

/// New verification code payload
#[derive(Debug, Clone)]
pub struct NewVerificationCode {
    pub email: String,
    pub code: String,
    pub request_type: RequestType,
    pub created_at: DateTime<Utc>,
}
