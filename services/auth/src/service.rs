//! Authentication service facade
//!
//! The surface handlers call: session issuance and validation, refresh,
//! logout, and the verification code flow. Construction wires the token
//! issuer, validator and managers to one shared set of stores and one clock.

use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::error::{AuthError, AuthResult};
use crate::jwt::{JwtConfig, TokenIssuer};
use crate::models::{RequestType, SessionTokens, User, UserId};
use crate::repositories::user::verify_password;
use crate::repositories::{SessionStore, UserDirectory, VerificationCodeStore};
use crate::session::SessionManager;
use crate::validation::validate_email;
use crate::validator::SessionValidator;
use crate::verification::{CodeGenerator, CodeNotifier, VerificationCodeManager, VerificationConfig};

/// A verification code that has been stored and handed to the notifier
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedCode {
    pub email: String,
    #[serde(skip_serializing)]
    pub code: String,
    pub request_type: RequestType,
}

/// Authentication service
#[derive(Clone)]
pub struct AuthService {
    sessions: SessionManager,
    validator: SessionValidator,
    verification: VerificationCodeManager,
    users: Arc<dyn UserDirectory>,
    notifier: Arc<dyn CodeNotifier>,
}

impl AuthService {
    pub fn new(
        jwt: JwtConfig,
        verification: VerificationConfig,
        session_store: Arc<dyn SessionStore>,
        code_store: Arc<dyn VerificationCodeStore>,
        users: Arc<dyn UserDirectory>,
        notifier: Arc<dyn CodeNotifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let issuer = TokenIssuer::new(jwt, clock.clone());
        let validator = SessionValidator::new(
            issuer.clone(),
            session_store.clone(),
            users.clone(),
            clock.clone(),
        );
        let sessions = SessionManager::new(issuer, session_store, validator.clone(), clock.clone());
        let verification = VerificationCodeManager::new(code_store, clock, verification);

        Self {
            sessions,
            validator,
            verification,
            users,
            notifier,
        }
    }

    /// Replace the verification code generator
    pub fn with_code_generator(mut self, generator: Arc<dyn CodeGenerator>) -> Self {
        self.verification = self.verification.with_generator(generator);
        self
    }

    /// Check email and password, then open a session
    pub async fn login(&self, email: &str, password: &str) -> AuthResult<SessionTokens> {
        validate_email(email).map_err(AuthError::InvalidInput)?;

        let user = self
            .users
            .find_by_email(email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        let matches = verify_password(&user, password).map_err(|e| {
            warn!("Unusable password hash for user {}: {}", user.id, e);
            AuthError::PasswordHash(e.to_string())
        })?;
        if !matches {
            info!("Rejected login for {}", email);
            return Err(AuthError::InvalidCredentials);
        }

        self.issue_session(user.id).await
    }

    pub async fn issue_session(&self, user_id: UserId) -> AuthResult<SessionTokens> {
        self.sessions.issue_session(user_id).await
    }

    /// Authenticate an `Authorization` header value
    pub async fn authenticate(&self, authorization: Option<&str>) -> AuthResult<User> {
        self.validator.authenticate_bearer(authorization).await
    }

    /// Authenticate a bare access token
    pub async fn authenticate_token(&self, access_token: &str) -> AuthResult<User> {
        self.validator.authenticate_access(access_token).await
    }

    pub async fn refresh_session(&self, refresh_token: &str) -> AuthResult<String> {
        self.sessions.refresh_session(refresh_token).await
    }

    pub async fn auto_login(&self, refresh_token: &str) -> AuthResult<SessionTokens> {
        self.sessions.auto_login(refresh_token).await
    }

    pub async fn end_session(&self, user_id: UserId) -> AuthResult<()> {
        self.sessions.end_session(user_id).await
    }

    /// Issue and deliver a verification code for `email`
    ///
    /// Registered emails get a password-reset code, unknown ones a signup code.
    pub async fn request_verification(&self, email: &str) -> AuthResult<IssuedCode> {
        validate_email(email).map_err(AuthError::InvalidInput)?;

        let request_type = match self.users.find_by_email(email).await? {
            Some(_) => RequestType::ForgetPassword,
            None => RequestType::Signup,
        };

        let code = self.verification.request(email, request_type).await?;

        self.notifier
            .deliver(email, &code, request_type)
            .await
            .map_err(|e| AuthError::Notification(e.to_string()))?;

        Ok(IssuedCode {
            email: email.to_string(),
            code,
            request_type,
        })
    }

    /// Confirm a code; true exactly once per issued code
    pub async fn confirm_verification(
        &self,
        email: &str,
        code: &str,
        purpose: RequestType,
    ) -> AuthResult<bool> {
        self.verification.confirm(email, code, purpose).await
    }

    pub fn verification(&self) -> &VerificationCodeManager {
        &self.verification
    }
}
