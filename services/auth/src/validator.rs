//! Session validation
//!
//! A token is only as good as the store row behind it: after the signature
//! check every call sweeps expired rows, checks the user's live session count,
//! and looks the token's session uuid up again. Nothing is cached between
//! calls.

use std::sync::Arc;
use tracing::warn;

use crate::clock::Clock;
use crate::error::{AuthError, AuthResult};
use crate::jwt::{Claims, TokenIssuer};
use crate::models::{TokenKind, User};
use crate::repositories::{SessionStore, UserDirectory};

/// Resolves presented tokens to authenticated users
#[derive(Clone)]
pub struct SessionValidator {
    issuer: TokenIssuer,
    sessions: Arc<dyn SessionStore>,
    users: Arc<dyn UserDirectory>,
    clock: Arc<dyn Clock>,
}

impl SessionValidator {
    pub fn new(
        issuer: TokenIssuer,
        sessions: Arc<dyn SessionStore>,
        users: Arc<dyn UserDirectory>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            issuer,
            sessions,
            users,
            clock,
        }
    }

    /// Value of an `Authorization` header, or `None` when absent
    pub async fn authenticate_bearer(&self, header: Option<&str>) -> AuthResult<User> {
        let token = header
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(AuthError::MissingToken)?;

        self.authenticate_access(token).await
    }

    pub async fn authenticate_access(&self, token: &str) -> AuthResult<User> {
        self.authenticate(token, TokenKind::Access).await
    }

    pub async fn authenticate_refresh(&self, token: &str) -> AuthResult<User> {
        self.authenticate(token, TokenKind::Refresh).await
    }

    /// Verify `token` as a `kind` token and resolve its live session to a user
    pub async fn authenticate(&self, token: &str, kind: TokenKind) -> AuthResult<User> {
        let (user, _claims) = self.authenticate_with_claims(token, kind).await?;
        Ok(user)
    }

    /// Like [`authenticate`](Self::authenticate), also returning the verified claims
    pub async fn authenticate_with_claims(
        &self,
        token: &str,
        kind: TokenKind,
    ) -> AuthResult<(User, Claims)> {
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }

        let claims = self.issuer.verify(token, kind)?;

        let now = self.clock.now();
        self.sessions.sweep_expired(now).await?;

        let active = self.sessions.count_active(claims.sub, kind, now).await?;
        if active == 0 {
            return Err(AuthError::SessionExpired);
        }
        if active > 1 {
            warn!(
                "User {} holds {} active {:?} sessions, rejecting",
                claims.sub, active, kind
            );
            return Err(AuthError::MultiSessionAnomaly(claims.sub));
        }

        let user_id = self
            .sessions
            .find_user_by_session_uuid(claims.session_uuid, claims.sub, kind, now)
            .await?
            .ok_or(AuthError::SessionExpired)?;

        match self.users.find_by_id(user_id).await? {
            Some(user) => Ok((user, claims)),
            None => {
                let removed = self.sessions.delete_user(user_id).await?;
                warn!(
                    "Session of deleted user {} presented, removed {} rows",
                    user_id, removed
                );
                Err(AuthError::AccountNotFound)
            }
        }
    }
}
