//! Verification code lifecycle
//!
//! Codes prove control of an email address for signup or password reset. A
//! code is issued `WAITING`, can be re-issued only once the throttle window has
//! passed (which supersedes the previous code), and is completed by a matching
//! confirmation inside the validity window. Stale rows are purged lazily
//! whenever an email's codes are checked.

use async_trait::async_trait;
use chrono::Duration;
use rand::Rng;
use std::sync::Arc;
use tracing::info;

use crate::clock::Clock;
use crate::config::parse_or_default;
use crate::error::{AuthError, AuthResult};
use crate::models::{NewVerificationCode, RequestType};
use crate::rate_limiter::{AttemptLimiter, AttemptLimiterConfig};
use crate::repositories::VerificationCodeStore;
use crate::validation::{validate_code, validate_email};

/// Verification code configuration
#[derive(Debug, Clone)]
pub struct VerificationConfig {
    /// Number of digits in a code
    pub code_length: usize,
    /// Minimum age of the waiting code before a new one may be issued
    pub throttle_window: Duration,
    /// How long an issued code stays usable
    pub validity_window: Duration,
    /// Failed confirmations tolerated per email per validity window
    pub max_attempts: u32,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            code_length: 6,
            throttle_window: Duration::seconds(60),
            validity_window: Duration::seconds(300),
            max_attempts: 5,
        }
    }
}

impl VerificationConfig {
    /// Create a new VerificationConfig from environment variables
    ///
    /// # Environment Variables
    /// - `VERIFICATION_CODE_LENGTH`: digits per code (default: 6)
    /// - `VERIFICATION_THROTTLE_SECONDS`: re-issue throttle (default: 60)
    /// - `VERIFICATION_VALIDITY_SECONDS`: code validity (default: 300)
    /// - `VERIFICATION_MAX_ATTEMPTS`: failed confirmations per window (default: 5)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let code_length = parse_or_default("VERIFICATION_CODE_LENGTH", defaults.code_length).max(1);
        let throttle_seconds = parse_or_default(
            "VERIFICATION_THROTTLE_SECONDS",
            defaults.throttle_window.num_seconds(),
        );
        let validity_seconds = parse_or_default(
            "VERIFICATION_VALIDITY_SECONDS",
            defaults.validity_window.num_seconds(),
        );
        let max_attempts =
            parse_or_default("VERIFICATION_MAX_ATTEMPTS", defaults.max_attempts).max(1);

        Self {
            code_length,
            throttle_window: Duration::seconds(throttle_seconds.max(0)),
            validity_window: Duration::seconds(validity_seconds.max(1)),
            max_attempts,
        }
    }
}

/// Source of fresh numeric codes
pub trait CodeGenerator: Send + Sync {
    fn generate(&self, length: usize) -> String;
}

/// Uniformly random decimal codes from the thread-local RNG
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomCodeGenerator;

impl CodeGenerator for RandomCodeGenerator {
    fn generate(&self, length: usize) -> String {
        let mut rng = rand::thread_rng();
        (0..length)
            .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
            .collect()
    }
}

/// Delivers an issued code to its owner
#[async_trait]
pub trait CodeNotifier: Send + Sync {
    async fn deliver(
        &self,
        email: &str,
        code: &str,
        request_type: RequestType,
    ) -> anyhow::Result<()>;
}

/// Notifier that only records the delivery in the log
///
/// The code itself is never written out.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl CodeNotifier for LogNotifier {
    async fn deliver(
        &self,
        email: &str,
        _code: &str,
        request_type: RequestType,
    ) -> anyhow::Result<()> {
        info!(
            "{} verification code ready for delivery to {}",
            request_type.label(),
            email
        );
        Ok(())
    }
}

/// Issues, validates and consumes verification codes
#[derive(Clone)]
pub struct VerificationCodeManager {
    store: Arc<dyn VerificationCodeStore>,
    generator: Arc<dyn CodeGenerator>,
    limiter: AttemptLimiter,
    clock: Arc<dyn Clock>,
    config: VerificationConfig,
}

impl VerificationCodeManager {
    pub fn new(
        store: Arc<dyn VerificationCodeStore>,
        clock: Arc<dyn Clock>,
        config: VerificationConfig,
    ) -> Self {
        let limiter = AttemptLimiter::new(
            AttemptLimiterConfig {
                max_attempts: config.max_attempts,
                window: config.validity_window,
            },
            clock.clone(),
        );

        Self {
            store,
            generator: Arc::new(RandomCodeGenerator),
            limiter,
            clock,
            config,
        }
    }

    /// Replace the code generator
    pub fn with_generator(mut self, generator: Arc<dyn CodeGenerator>) -> Self {
        self.generator = generator;
        self
    }

    pub fn config(&self) -> &VerificationConfig {
        &self.config
    }

    /// Issue a new code for `email`
    ///
    /// Fails with [`AuthError::Throttled`] while a waiting code younger than
    /// the throttle window exists. Otherwise earlier waiting codes are
    /// superseded and the new code is returned for delivery.
    pub async fn request(&self, email: &str, request_type: RequestType) -> AuthResult<String> {
        validate_email(email).map_err(AuthError::InvalidInput)?;

        let now = self.clock.now();
        let throttle_start = now - self.config.throttle_window;

        if let Some(latest) = self.store.latest_waiting_after(email, throttle_start).await? {
            let retry_after = latest.created_at + self.config.throttle_window - now;
            info!("Verification code for {} throttled", email);
            return Err(AuthError::Throttled {
                retry_after_seconds: retry_after.num_seconds().max(1),
            });
        }

        let code = self.generator.generate(self.config.code_length);
        self.store
            .issue(&NewVerificationCode {
                email: email.to_string(),
                code: code.clone(),
                request_type,
                created_at: now,
            })
            .await?;

        info!("Issued {} verification code for {}", request_type.label(), email);
        Ok(code)
    }

    /// Check a code against the email's waiting codes younger than `window`
    ///
    /// Codes of the email older than `window` are deleted first. A mismatch is
    /// `Ok(false)`, not an error.
    pub async fn validate(
        &self,
        email: &str,
        code: &str,
        request_type: RequestType,
        window: Duration,
    ) -> AuthResult<bool> {
        let since = self.clock.now() - window;
        self.store.purge_older_than(email, since).await?;

        let matching = self
            .store
            .count_matching(email, code, request_type, since)
            .await?;

        Ok(matching > 0)
    }

    /// Mark the email's waiting code of `request_type` complete
    ///
    /// Meant to follow a successful [`validate`](Self::validate); with nothing
    /// to complete it fails with [`AuthError::CodeInvalidOrExpired`].
    pub async fn consume(&self, email: &str, request_type: RequestType) -> AuthResult<()> {
        let completed = self.store.mark_complete(email, request_type).await?;
        if completed == 0 {
            return Err(AuthError::CodeInvalidOrExpired);
        }

        info!("Consumed {} verification code for {}", request_type.label(), email);
        Ok(())
    }

    /// Validate and consume in one atomic step
    ///
    /// Returns true exactly once per issued code. Each attempt is reserved
    /// against the email's budget before the store is consulted, and a
    /// success hands the budget back.
    pub async fn confirm(
        &self,
        email: &str,
        code: &str,
        request_type: RequestType,
    ) -> AuthResult<bool> {
        validate_email(email).map_err(AuthError::InvalidInput)?;
        validate_code(code, self.config.code_length).map_err(AuthError::InvalidInput)?;

        if !self.limiter.try_acquire(email).await {
            return Err(AuthError::TooManyAttempts);
        }

        let since = self.clock.now() - self.config.validity_window;
        self.store.purge_older_than(email, since).await?;

        let confirmed = self
            .store
            .complete_if_valid(email, code, request_type, since)
            .await?;

        if confirmed {
            self.limiter.reset(email).await;
            info!("Confirmed {} verification code for {}", request_type.label(), email);
        }

        Ok(confirmed)
    }
}
