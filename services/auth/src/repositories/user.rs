//! User lookups for session resolution and credential checks

use anyhow::Result;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use async_trait::async_trait;
use common::error::DatabaseResult;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use crate::models::{User, UserId};

/// Read-only view of the user table
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_id(&self, id: UserId) -> DatabaseResult<Option<User>>;

    async fn find_by_email(&self, email: &str) -> DatabaseResult<Option<User>>;
}

/// User repository
#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    /// Create a new user repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for UserRepository {
    async fn find_by_id(&self, id: UserId) -> DatabaseResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, email, password AS password_hash, provider, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> DatabaseResult<Option<User>> {
        info!("Finding user by email: {}", email);

        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, email, password AS password_hash, provider, created_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }
}

/// In-process user directory
#[derive(Debug, Clone, Default)]
pub struct MemoryUserDirectory {
    users: Arc<Mutex<HashMap<UserId, User>>>,
}

impl MemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, user: User) {
        self.users.lock().await.insert(user.id, user);
    }

    /// Remove a user, as the account service does on deletion
    pub async fn remove(&self, id: UserId) -> Option<User> {
        self.users.lock().await.remove(&id)
    }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn find_by_id(&self, id: UserId) -> DatabaseResult<Option<User>> {
        Ok(self.users.lock().await.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> DatabaseResult<Option<User>> {
        Ok(self
            .users
            .lock()
            .await
            .values()
            .find(|user| user.email == email)
            .cloned())
    }
}

/// Hash a password with argon2 and a fresh salt
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut rand::thread_rng());
    let argon2 = Argon2::default();
    let password_hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?
        .to_string();

    Ok(password_hash)
}

/// Verify a password against a stored argon2 hash
///
/// Users registered through an external provider have no usable hash and
/// never match.
pub fn verify_password(user: &User, password: &str) -> Result<bool> {
    if user.password_hash.is_empty() {
        return Ok(false);
    }

    let parsed_hash = PasswordHash::new(&user.password_hash)
        .map_err(|e| anyhow::anyhow!("Failed to parse password hash: {}", e))?;

    let argon2 = Argon2::default();
    let result = argon2.verify_password(password.as_bytes(), &parsed_hash);

    Ok(result.is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn user(id: UserId, email: &str, password_hash: String) -> User {
        User {
            id,
            name: "Carrier".to_string(),
            email: email.to_string(),
            password_hash,
            provider: "email".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_password_round_trip() {
        let hash = hash_password("s3cret-pass").unwrap();
        let user = user(1, "a@example.com", hash);

        assert!(verify_password(&user, "s3cret-pass").unwrap());
        assert!(!verify_password(&user, "wrong").unwrap());
    }

    #[test]
    fn test_provider_user_without_hash_never_matches() {
        let user = user(1, "a@example.com", String::new());
        assert!(!verify_password(&user, "").unwrap());
    }

    #[tokio::test]
    async fn test_memory_directory_lookup_and_remove() {
        let directory = MemoryUserDirectory::new();
        directory.insert(user(3, "c@example.com", String::new())).await;

        assert_eq!(
            directory.find_by_email("c@example.com").await.unwrap().map(|u| u.id),
            Some(3)
        );

        directory.remove(3).await;
        assert!(directory.find_by_id(3).await.unwrap().is_none());
    }
}
