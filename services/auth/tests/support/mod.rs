//! Shared fixtures for the integration tests: in-memory stores, a manual
//! clock and a notifier that records what it was asked to deliver.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;

use carrier_auth::{
    clock::ManualClock,
    jwt::JwtConfig,
    models::{RequestType, User, UserId},
    repositories::{MemorySessionStore, MemoryUserDirectory, MemoryVerificationCodeStore},
    service::AuthService,
    verification::{CodeGenerator, CodeNotifier, VerificationConfig},
};

pub const ACCESS_TTL: i64 = 900;
pub const REFRESH_TTL: i64 = 604_800;
pub const LEEWAY: i64 = 60;

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap()
}

pub fn jwt_config() -> JwtConfig {
    JwtConfig {
        access_secret: "integration-access-secret".to_string(),
        refresh_secret: "integration-refresh-secret".to_string(),
        access_token_expiry: ACCESS_TTL as u64,
        refresh_token_expiry: REFRESH_TTL as u64,
        leeway: LEEWAY as u64,
    }
}

pub fn user(id: UserId, email: &str, password_hash: &str) -> User {
    User {
        id,
        name: format!("user-{}", id),
        email: email.to_string(),
        password_hash: password_hash.to_string(),
        provider: "email".to_string(),
        created_at: t0(),
    }
}

/// Notifier that keeps every delivery and can be told to fail
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<(String, String, RequestType)>>>,
    failing: Arc<Mutex<bool>>,
}

impl RecordingNotifier {
    pub async fn fail_deliveries(&self, failing: bool) {
        *self.failing.lock().await = failing;
    }

    pub async fn sent(&self) -> Vec<(String, String, RequestType)> {
        self.sent.lock().await.clone()
    }

    /// Most recent code delivered to `email`
    pub async fn last_code(&self, email: &str) -> Option<String> {
        self.sent
            .lock()
            .await
            .iter()
            .rev()
            .find(|(to, _, _)| to == email)
            .map(|(_, code, _)| code.clone())
    }
}

#[async_trait]
impl CodeNotifier for RecordingNotifier {
    async fn deliver(
        &self,
        email: &str,
        code: &str,
        request_type: RequestType,
    ) -> anyhow::Result<()> {
        if *self.failing.lock().await {
            anyhow::bail!("mail relay unavailable");
        }
        self.sent
            .lock()
            .await
            .push((email.to_string(), code.to_string(), request_type));
        Ok(())
    }
}

/// Hands out the queued codes in order, then repeats the last one
#[derive(Debug)]
pub struct ScriptedCodes {
    codes: std::sync::Mutex<Vec<String>>,
}

impl ScriptedCodes {
    pub fn new(codes: &[&str]) -> Self {
        Self {
            codes: std::sync::Mutex::new(codes.iter().rev().map(|c| c.to_string()).collect()),
        }
    }
}

impl CodeGenerator for ScriptedCodes {
    fn generate(&self, length: usize) -> String {
        let mut codes = self.codes.lock().unwrap();
        match codes.len() {
            0 => "0".repeat(length),
            1 => codes[0].clone(),
            _ => codes.pop().unwrap(),
        }
    }
}

pub struct Harness {
    pub auth: AuthService,
    pub clock: ManualClock,
    pub sessions: MemorySessionStore,
    pub codes: MemoryVerificationCodeStore,
    pub users: MemoryUserDirectory,
    pub notifier: RecordingNotifier,
}

impl Harness {
    pub fn new() -> Self {
        let clock = ManualClock::new(t0());
        let sessions = MemorySessionStore::with_clock(Arc::new(clock.clone()));
        let codes = MemoryVerificationCodeStore::new();
        let users = MemoryUserDirectory::new();
        let notifier = RecordingNotifier::default();

        let auth = AuthService::new(
            jwt_config(),
            VerificationConfig::default(),
            Arc::new(sessions.clone()),
            Arc::new(codes.clone()),
            Arc::new(users.clone()),
            Arc::new(notifier.clone()),
            Arc::new(clock.clone()),
        );

        Self {
            auth,
            clock,
            sessions,
            codes,
            users,
            notifier,
        }
    }

    pub fn with_codes(mut self, codes: &[&str]) -> Self {
        self.auth = self
            .auth
            .with_code_generator(Arc::new(ScriptedCodes::new(codes)));
        self
    }

    /// Add a user without a usable password
    pub async fn add_user(&self, id: UserId, email: &str) -> User {
        let user = user(id, email, "");
        self.users.insert(user.clone()).await;
        user
    }
}
