//! Session issuance, refresh and teardown

use std::sync::Arc;
use tracing::info;

use crate::clock::Clock;
use crate::error::{AuthError, AuthResult};
use crate::jwt::TokenIssuer;
use crate::models::{SessionTokens, TokenKind, UserId};
use crate::repositories::SessionStore;
use crate::validator::SessionValidator;

/// Session manager
///
/// Keeps at most one live access session per user: logins are refused while
/// one exists, and refresh or auto-login replace it.
#[derive(Clone)]
pub struct SessionManager {
    issuer: TokenIssuer,
    sessions: Arc<dyn SessionStore>,
    validator: SessionValidator,
    clock: Arc<dyn Clock>,
}

impl SessionManager {
    /// Create a new session manager
    pub fn new(
        issuer: TokenIssuer,
        sessions: Arc<dyn SessionStore>,
        validator: SessionValidator,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            issuer,
            sessions,
            validator,
            clock,
        }
    }

    /// Open a new session for a user who just proved their credentials
    ///
    /// Fails with [`AuthError::SessionConflict`] if the user already holds a
    /// live access session.
    pub async fn issue_session(&self, user_id: UserId) -> AuthResult<SessionTokens> {
        let access = self.issuer.issue_access_token(user_id)?;
        let refresh = self.issuer.issue_refresh_token(user_id)?;

        let saved = self
            .sessions
            .save_exclusive(user_id, &access.session, &refresh.session, self.clock.now())
            .await?;

        if !saved {
            info!("Refused login for user {}: active session elsewhere", user_id);
            return Err(AuthError::SessionConflict);
        }

        info!("Issued session for user {}", user_id);
        Ok(SessionTokens {
            access_token: access.token,
            refresh_token: refresh.token,
        })
    }

    /// Mint a new access token from a live refresh token
    ///
    /// The previous access session of the user is replaced.
    pub async fn refresh_session(&self, refresh_token: &str) -> AuthResult<String> {
        let user = self.validator.authenticate_refresh(refresh_token).await?;

        let access = self.issuer.issue_access_token(user.id)?;
        self.sessions.rotate_access(user.id, &access.session).await?;

        info!("Refreshed access token for user {}", user.id);
        Ok(access.token)
    }

    /// Exchange a live refresh token for a fresh token pair
    ///
    /// Both rows are replaced in one store step, conditioned on the presented
    /// refresh uuid still being current. Of several concurrent replays of one
    /// refresh token only the first succeeds; the rest fail with
    /// [`AuthError::SessionExpired`].
    pub async fn auto_login(&self, refresh_token: &str) -> AuthResult<SessionTokens> {
        let (user, claims) = self
            .validator
            .authenticate_with_claims(refresh_token, TokenKind::Refresh)
            .await?;

        let refresh = self.issuer.issue_refresh_token(user.id)?;
        let access = self.issuer.issue_access_token(user.id)?;

        let rotated = self
            .sessions
            .rotate_pair(
                user.id,
                claims.session_uuid,
                &refresh.session,
                &access.session,
                self.clock.now(),
            )
            .await?;
        if !rotated {
            info!("Refresh token of user {} was already rotated", user.id);
            return Err(AuthError::SessionExpired);
        }

        info!("Auto-login for user {}", user.id);
        Ok(SessionTokens {
            access_token: access.token,
            refresh_token: refresh.token,
        })
    }

    /// Remove every session row of the user
    pub async fn end_session(&self, user_id: UserId) -> AuthResult<()> {
        let removed = self.sessions.delete_user(user_id).await?;
        info!("Ended session for user {} ({} rows)", user_id, removed);
        Ok(())
    }
}
