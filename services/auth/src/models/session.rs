//! Session token model and related functionality

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::UserId;

/// Kind of token a session row backs
///
/// Stored as `SMALLINT`: access = 0, refresh = 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[repr(i16)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access = 0,
    Refresh = 1,
}

/// Session token row
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SessionToken {
    pub id: i64,
    pub user_id: UserId,
    pub session_uuid: Uuid,
    pub kind: TokenKind,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl SessionToken {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expires_at >= now
    }
}

/// Session row payload produced at token issuance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSession {
    pub session_uuid: Uuid,
    pub kind: TokenKind,
    pub expires_at: DateTime<Utc>,
}

/// A signed token together with the session row it must be stored as
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub session: NewSession,
}

impl IssuedToken {
    pub fn session_uuid(&self) -> Uuid {
        self.session.session_uuid
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.session.expires_at
    }
}

/// Token pair handed to a client after login or auto-login
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionTokens {
    pub access_token: String,
    pub refresh_token: String,
}
