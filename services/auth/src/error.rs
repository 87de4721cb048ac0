//! Error taxonomy for session and verification-code handling
//!
//! Every failure path of the lifecycle manager maps to exactly one variant.
//! Token and session problems surface as 401 responses; infrastructure
//! problems become opaque 500s after being logged.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use common::error::DatabaseError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::models::UserId;

/// Authentication and verification errors
#[derive(Error, Debug)]
pub enum AuthError {
    /// No bearer token was presented
    #[error("missing bearer token")]
    MissingToken,

    /// The token could not be decoded into the expected claims
    #[error("malformed token")]
    MalformedToken,

    /// The token signature does not match the server secret
    #[error("invalid token signature")]
    InvalidSignature,

    /// The token's own expiry has passed
    #[error("token expired")]
    TokenExpired,

    /// The token is well formed but no live session row backs it
    #[error("session expired, log in again")]
    SessionExpired,

    /// More than one live session row exists for the user and kind
    #[error("multiple active sessions for user {0}")]
    MultiSessionAnomaly(UserId),

    /// The session resolved to a user that no longer exists
    #[error("account not found")]
    AccountNotFound,

    /// Email/password pair did not match
    #[error("invalid email or password")]
    InvalidCredentials,

    /// Login refused because another device holds the access session
    #[error("logged in from other device")]
    SessionConflict,

    /// A verification code was issued too recently
    #[error("verification code has already been sent, retry in {retry_after_seconds} seconds")]
    Throttled { retry_after_seconds: i64 },

    /// The presented verification code does not match a waiting code
    #[error("wrong verification code or code has expired")]
    CodeInvalidOrExpired,

    /// Too many failed confirmations for one email
    #[error("too many verification attempts, request a new code later")]
    TooManyAttempts,

    /// Request payload failed validation
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The notification collaborator could not deliver a code
    #[error("failed to deliver verification code: {0}")]
    Notification(String),

    /// Token signing failed
    #[error("failed to sign token: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),

    /// Token settings that cannot produce a valid expiry
    #[error("invalid token configuration: {0}")]
    Configuration(String),

    /// A stored password hash could not be parsed
    #[error("stored password hash is unusable: {0}")]
    PasswordHash(String),

    /// Backing store failure
    #[error(transparent)]
    Store(#[from] DatabaseError),
}

impl From<sqlx::Error> for AuthError {
    fn from(err: sqlx::Error) -> Self {
        AuthError::Store(DatabaseError::Query(err))
    }
}

impl AuthError {
    /// Stable machine-readable code for clients and logs
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::MissingToken => "missing_token",
            AuthError::MalformedToken => "malformed_token",
            AuthError::InvalidSignature => "invalid_signature",
            AuthError::TokenExpired => "token_expired",
            AuthError::SessionExpired => "session_expired",
            AuthError::MultiSessionAnomaly(_) => "multi_session_anomaly",
            AuthError::AccountNotFound => "account_not_found",
            AuthError::InvalidCredentials => "invalid_credentials",
            AuthError::SessionConflict => "session_conflict",
            AuthError::Throttled { .. } => "throttled",
            AuthError::CodeInvalidOrExpired => "code_invalid_or_expired",
            AuthError::TooManyAttempts => "too_many_attempts",
            AuthError::InvalidInput(_) => "invalid_input",
            AuthError::Notification(_) => "notification_failed",
            AuthError::Signing(_) => "signing_error",
            AuthError::Configuration(_) => "configuration_error",
            AuthError::PasswordHash(_) => "password_hash_error",
            AuthError::Store(_) => "store_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::MissingToken
            | AuthError::MalformedToken
            | AuthError::InvalidSignature
            | AuthError::TokenExpired
            | AuthError::SessionExpired
            | AuthError::MultiSessionAnomaly(_)
            | AuthError::AccountNotFound
            | AuthError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AuthError::SessionConflict => StatusCode::CONFLICT,
            AuthError::Throttled { .. } | AuthError::TooManyAttempts => {
                StatusCode::TOO_MANY_REQUESTS
            }
            AuthError::CodeInvalidOrExpired | AuthError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AuthError::Notification(_)
            | AuthError::Signing(_)
            | AuthError::Configuration(_)
            | AuthError::PasswordHash(_)
            | AuthError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the failure is an infrastructure fault rather than a client problem
    pub fn is_internal(&self) -> bool {
        self.status() == StatusCode::INTERNAL_SERVER_ERROR
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if self.is_internal() {
            error!("Internal authentication failure: {}", self);
            "Internal server error".to_string()
        } else if let AuthError::MultiSessionAnomaly(_) = self {
            // user ids stay out of client responses
            "logged in from other device".to_string()
        } else {
            self.to_string()
        };

        let body = Json(json!({
            "error": message,
            "code": self.kind(),
        }));

        (status, body).into_response()
    }
}

/// Type alias for results produced by this crate
pub type AuthResult<T> = Result<T, AuthError>;
