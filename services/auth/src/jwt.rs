//! JWT token issuer for access and refresh tokens
//!
//! Both token kinds are HS256-signed and carry a fixed claim set: the subject
//! user id, the session uuid mirrored in the session store, and the expiry.
//! Access and refresh tokens are signed with distinct secrets so a leaked
//! access secret cannot mint refresh tokens.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    clock::Clock,
    config::{parse_or_default, required_var},
    error::{AuthError, AuthResult},
    models::{IssuedToken, NewSession, TokenKind, UserId},
};

/// JWT configuration
#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// HMAC secret for access tokens
    pub access_secret: String,
    /// HMAC secret for refresh tokens
    pub refresh_secret: String,
    /// Access token lifetime in seconds
    pub access_token_expiry: u64,
    /// Refresh token lifetime in seconds
    pub refresh_token_expiry: u64,
    /// Clock skew tolerated on the token's own `exp` claim, in seconds
    pub leeway: u64,
}

impl JwtConfig {
    /// Create a new JwtConfig from environment variables
    ///
    /// # Environment Variables
    /// - `JWT_ACCESS_SECRET`: HMAC secret for access tokens (required)
    /// - `JWT_REFRESH_SECRET`: HMAC secret for refresh tokens (required, distinct from the access secret)
    /// - `JWT_ACCESS_EXP`: Access token expiry in seconds (required)
    /// - `JWT_REFRESH_EXP`: Refresh token expiry in seconds (required)
    /// - `JWT_LEEWAY_SECONDS`: Leeway on the `exp` claim (default: 60)
    pub fn from_env() -> Result<Self> {
        let access_secret = required_var("JWT_ACCESS_SECRET")?;
        let refresh_secret = required_var("JWT_REFRESH_SECRET")?;

        let access_token_expiry = required_var("JWT_ACCESS_EXP")?
            .parse()
            .map_err(|e| anyhow::anyhow!("JWT_ACCESS_EXP must be a number of seconds: {}", e))?;

        let refresh_token_expiry = required_var("JWT_REFRESH_EXP")?
            .parse()
            .map_err(|e| anyhow::anyhow!("JWT_REFRESH_EXP must be a number of seconds: {}", e))?;

        let config = JwtConfig {
            access_secret,
            refresh_secret,
            access_token_expiry,
            refresh_token_expiry,
            leeway: parse_or_default("JWT_LEEWAY_SECONDS", 60),
        };
        config.validate()?;

        Ok(config)
    }

    /// Reject configurations that would weaken token separation
    pub fn validate(&self) -> Result<()> {
        if self.access_secret == self.refresh_secret {
            anyhow::bail!("JWT_ACCESS_SECRET and JWT_REFRESH_SECRET must differ");
        }
        if self.access_token_expiry == 0 || self.refresh_token_expiry == 0 {
            anyhow::bail!("token expiry must be greater than zero");
        }
        for (name, seconds) in [
            ("JWT_ACCESS_EXP", self.access_token_expiry),
            ("JWT_REFRESH_EXP", self.refresh_token_expiry),
            ("JWT_LEEWAY_SECONDS", self.leeway),
        ] {
            let representable = seconds_to_duration(seconds)
                .and_then(|duration| Utc::now().checked_add_signed(duration))
                .is_some();
            if !representable {
                anyhow::bail!("{} of {} seconds is out of range", name, seconds);
            }
        }
        Ok(())
    }

    fn expiry(&self, kind: TokenKind) -> u64 {
        match kind {
            TokenKind::Access => self.access_token_expiry,
            TokenKind::Refresh => self.refresh_token_expiry,
        }
    }
}

fn seconds_to_duration(seconds: u64) -> Option<Duration> {
    i64::try_from(seconds).ok().and_then(Duration::try_seconds)
}

/// JWT claims structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User ID
    pub sub: UserId,
    /// Session uuid mirrored in the session store
    pub session_uuid: Uuid,
    /// Issued at time
    pub iat: i64,
    /// Expiration time
    pub exp: i64,
    /// Token type (access or refresh)
    pub token_type: TokenKind,
}

#[derive(Clone)]
struct SigningKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SigningKeys {
    fn from_secret(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

/// Token issuer
#[derive(Clone)]
pub struct TokenIssuer {
    access_keys: SigningKeys,
    refresh_keys: SigningKeys,
    config: JwtConfig,
    clock: Arc<dyn Clock>,
}

impl TokenIssuer {
    /// Initialize a new token issuer
    pub fn new(config: JwtConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            access_keys: SigningKeys::from_secret(&config.access_secret),
            refresh_keys: SigningKeys::from_secret(&config.refresh_secret),
            config,
            clock,
        }
    }

    /// Generate an access token for a user
    pub fn issue_access_token(&self, user_id: UserId) -> AuthResult<IssuedToken> {
        self.issue(user_id, TokenKind::Access)
    }

    /// Generate a refresh token for a user
    pub fn issue_refresh_token(&self, user_id: UserId) -> AuthResult<IssuedToken> {
        self.issue(user_id, TokenKind::Refresh)
    }

    fn issue(&self, user_id: UserId, kind: TokenKind) -> AuthResult<IssuedToken> {
        let now = self.clock.now();
        let expires_at = seconds_to_duration(self.config.expiry(kind))
            .and_then(|ttl| now.checked_add_signed(ttl))
            .ok_or_else(|| {
                AuthError::Configuration(format!("{:?} token lifetime is out of range", kind))
            })?;

        let claims = Claims {
            sub: user_id,
            session_uuid: Uuid::new_v4(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            token_type: kind,
        };

        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &self.keys(kind).encoding,
        )
        .map_err(AuthError::Signing)?;

        Ok(IssuedToken {
            token,
            session: NewSession {
                session_uuid: claims.session_uuid,
                kind,
                expires_at,
            },
        })
    }

    /// Verify a token of the given kind and return its claims
    pub fn verify(&self, token: &str, kind: TokenKind) -> AuthResult<Claims> {
        verify_signature(
            token,
            &self.keys(kind).decoding,
            kind,
            self.clock.now(),
            self.config.leeway,
        )
    }

    /// Get the access token expiry time
    pub fn access_token_expiry(&self) -> u64 {
        self.config.access_token_expiry
    }

    /// Get the refresh token expiry time
    pub fn refresh_token_expiry(&self) -> u64 {
        self.config.refresh_token_expiry
    }

    fn keys(&self, kind: TokenKind) -> &SigningKeys {
        match kind {
            TokenKind::Access => &self.access_keys,
            TokenKind::Refresh => &self.refresh_keys,
        }
    }
}

/// Check a token's signature, claim shape and expiry without touching the store
///
/// Expiry is compared against `now` rather than the system clock; `leeway`
/// seconds past `exp` are still accepted.
pub fn verify_signature(
    token: &str,
    key: &DecodingKey,
    kind: TokenKind,
    now: DateTime<Utc>,
    leeway: u64,
) -> AuthResult<Claims> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = false;
    validation.set_required_spec_claims(&["exp"]);

    let claims = decode::<Claims>(token, key, &validation)
        .map_err(|e| match e.kind() {
            ErrorKind::InvalidSignature => AuthError::InvalidSignature,
            ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::MalformedToken,
        })?
        .claims;

    if claims.token_type != kind {
        return Err(AuthError::MalformedToken);
    }

    if claims
        .exp
        .saturating_add(i64::try_from(leeway).unwrap_or(i64::MAX)) < now.timestamp() {
        return Err(AuthError::TokenExpired);
    }

    Ok(claims)
}
