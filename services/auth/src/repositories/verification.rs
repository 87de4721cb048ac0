//! Verification code store
//!
//! A code is matchable only while it is `WAITING` and no older than the
//! validity window the caller passes in as `since`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::error::DatabaseResult;
use sqlx::PgPool;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::models::{CodeStatus, NewVerificationCode, RequestType, VerificationCode};

#[async_trait]
pub trait VerificationCodeStore: Send + Sync {
    /// Store a new WAITING code, superseding earlier WAITING codes of the email
    async fn issue(&self, code: &NewVerificationCode) -> DatabaseResult<VerificationCode>;

    /// Newest WAITING code of the email created strictly after `after`
    async fn latest_waiting_after(
        &self,
        email: &str,
        after: DateTime<Utc>,
    ) -> DatabaseResult<Option<VerificationCode>>;

    /// Delete every code of the email created before `before`
    async fn purge_older_than(&self, email: &str, before: DateTime<Utc>) -> DatabaseResult<u64>;

    /// Count WAITING rows matching email, code and type created at or after `since`
    async fn count_matching(
        &self,
        email: &str,
        code: &str,
        request_type: RequestType,
        since: DateTime<Utc>,
    ) -> DatabaseResult<i64>;

    /// Move the email's WAITING codes of one type to COMPLETE
    async fn mark_complete(&self, email: &str, request_type: RequestType) -> DatabaseResult<u64>;

    /// Atomically complete a matching WAITING code created at or after `since`
    async fn complete_if_valid(
        &self,
        email: &str,
        code: &str,
        request_type: RequestType,
        since: DateTime<Utc>,
    ) -> DatabaseResult<bool>;

    /// Every stored code of the email, newest first
    async fn find_by_email(&self, email: &str) -> DatabaseResult<Vec<VerificationCode>>;
}

/// PostgreSQL-backed verification code store
#[derive(Clone)]
pub struct PgVerificationCodeStore {
    pool: PgPool,
}

impl PgVerificationCodeStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VerificationCodeStore for PgVerificationCodeStore {
    async fn issue(&self, code: &NewVerificationCode) -> DatabaseResult<VerificationCode> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM verification_codes WHERE email = $1 AND status = $2")
            .bind(&code.email)
            .bind(CodeStatus::Waiting)
            .execute(&mut *tx)
            .await?;

        let row = sqlx::query_as::<_, VerificationCode>(
            r#"
            INSERT INTO verification_codes (email, code, request_type, status, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, email, code, request_type, status, created_at
            "#,
        )
        .bind(&code.email)
        .bind(&code.code)
        .bind(code.request_type)
        .bind(CodeStatus::Waiting)
        .bind(code.created_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(row)
    }

    async fn latest_waiting_after(
        &self,
        email: &str,
        after: DateTime<Utc>,
    ) -> DatabaseResult<Option<VerificationCode>> {
        let row = sqlx::query_as::<_, VerificationCode>(
            r#"
            SELECT id, email, code, request_type, status, created_at
            FROM verification_codes
            WHERE email = $1 AND status = $2 AND created_at > $3
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(email)
        .bind(CodeStatus::Waiting)
        .bind(after)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn purge_older_than(&self, email: &str, before: DateTime<Utc>) -> DatabaseResult<u64> {
        let result =
            sqlx::query("DELETE FROM verification_codes WHERE email = $1 AND created_at < $2")
                .bind(email)
                .bind(before)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected())
    }

    async fn count_matching(
        &self,
        email: &str,
        code: &str,
        request_type: RequestType,
        since: DateTime<Utc>,
    ) -> DatabaseResult<i64> {
        let count = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM verification_codes
            WHERE email = $1 AND code = $2 AND request_type = $3
              AND status = $4 AND created_at >= $5
            "#,
        )
        .bind(email)
        .bind(code)
        .bind(request_type)
        .bind(CodeStatus::Waiting)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn mark_complete(&self, email: &str, request_type: RequestType) -> DatabaseResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE verification_codes SET status = $1
            WHERE email = $2 AND request_type = $3 AND status = $4
            "#,
        )
        .bind(CodeStatus::Complete)
        .bind(email)
        .bind(request_type)
        .bind(CodeStatus::Waiting)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn complete_if_valid(
        &self,
        email: &str,
        code: &str,
        request_type: RequestType,
        since: DateTime<Utc>,
    ) -> DatabaseResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE verification_codes SET status = $1
            WHERE email = $2 AND code = $3 AND request_type = $4
              AND status = $5 AND created_at >= $6
            "#,
        )
        .bind(CodeStatus::Complete)
        .bind(email)
        .bind(code)
        .bind(request_type)
        .bind(CodeStatus::Waiting)
        .bind(since)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_by_email(&self, email: &str) -> DatabaseResult<Vec<VerificationCode>> {
        let rows = sqlx::query_as::<_, VerificationCode>(
            r#"
            SELECT id, email, code, request_type, status, created_at
            FROM verification_codes
            WHERE email = $1
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(email)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}

#[derive(Debug, Default)]
struct MemoryCodes {
    rows: Vec<VerificationCode>,
    next_id: i64,
}

/// In-process verification code store
#[derive(Debug, Clone, Default)]
pub struct MemoryVerificationCodeStore {
    state: Arc<Mutex<MemoryCodes>>,
}

impl MemoryVerificationCodeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn is_match(
    row: &VerificationCode,
    email: &str,
    code: &str,
    request_type: RequestType,
    since: DateTime<Utc>,
) -> bool {
    row.email == email
        && row.code == code
        && row.request_type == request_type
        && row.status == CodeStatus::Waiting
        && row.created_at >= since
}

#[async_trait]
impl VerificationCodeStore for MemoryVerificationCodeStore {
    async fn issue(&self, code: &NewVerificationCode) -> DatabaseResult<VerificationCode> {
        let mut state = self.state.lock().await;
        state
            .rows
            .retain(|row| row.email != code.email || row.status != CodeStatus::Waiting);

        state.next_id += 1;
        let row = VerificationCode {
            id: state.next_id,
            email: code.email.clone(),
            code: code.code.clone(),
            request_type: code.request_type,
            status: CodeStatus::Waiting,
            created_at: code.created_at,
        };
        state.rows.push(row.clone());
        Ok(row)
    }

    async fn latest_waiting_after(
        &self,
        email: &str,
        after: DateTime<Utc>,
    ) -> DatabaseResult<Option<VerificationCode>> {
        let state = self.state.lock().await;
        Ok(state
            .rows
            .iter()
            .filter(|row| {
                row.email == email && row.status == CodeStatus::Waiting && row.created_at > after
            })
            .max_by_key(|row| (row.created_at, row.id))
            .cloned())
    }

    async fn purge_older_than(&self, email: &str, before: DateTime<Utc>) -> DatabaseResult<u64> {
        let mut state = self.state.lock().await;
        let len = state.rows.len();
        state
            .rows
            .retain(|row| row.email != email || row.created_at >= before);
        Ok((len - state.rows.len()) as u64)
    }

    async fn count_matching(
        &self,
        email: &str,
        code: &str,
        request_type: RequestType,
        since: DateTime<Utc>,
    ) -> DatabaseResult<i64> {
        let state = self.state.lock().await;
        let count = state
            .rows
            .iter()
            .filter(|row| is_match(row, email, code, request_type, since))
            .count();
        Ok(count as i64)
    }

    async fn mark_complete(&self, email: &str, request_type: RequestType) -> DatabaseResult<u64> {
        let mut state = self.state.lock().await;
        let mut updated = 0;
        for row in state.rows.iter_mut().filter(|row| {
            row.email == email
                && row.request_type == request_type
                && row.status == CodeStatus::Waiting
        }) {
            row.status = CodeStatus::Complete;
            updated += 1;
        }
        Ok(updated)
    }

    async fn complete_if_valid(
        &self,
        email: &str,
        code: &str,
        request_type: RequestType,
        since: DateTime<Utc>,
    ) -> DatabaseResult<bool> {
        let mut state = self.state.lock().await;
        match state
            .rows
            .iter_mut()
            .find(|row| is_match(row, email, code, request_type, since))
        {
            Some(row) => {
                row.status = CodeStatus::Complete;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn find_by_email(&self, email: &str) -> DatabaseResult<Vec<VerificationCode>> {
        let state = self.state.lock().await;
        let mut rows: Vec<_> = state
            .rows
            .iter()
            .filter(|row| row.email == email)
            .cloned()
            .collect();
        rows.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(rows)
    }
}
