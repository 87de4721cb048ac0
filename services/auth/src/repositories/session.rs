//! Session store: the authoritative table of outstanding token uuids
//!
//! Rows are keyed by the session uuid embedded in each token. Refresh rows are
//! single-occupancy per user by construction (upsert); access rows are kept
//! single-occupancy by [`SessionStore::save_exclusive`],
//! [`SessionStore::rotate_access`] and [`SessionStore::rotate_pair`], which
//! decide cardinality under a per-user lock. The plain [`SessionStore::save`] and [`SessionStore::replace_access`]
//! primitives insert unconditionally.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::error::DatabaseResult;
use sqlx::{PgConnection, PgPool};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::models::{NewSession, SessionToken, TokenKind, UserId};

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert the access row and upsert the refresh row
    async fn save(
        &self,
        user_id: UserId,
        access: &NewSession,
        refresh: &NewSession,
    ) -> DatabaseResult<()>;

    /// Like [`SessionStore::save`], but only if the user holds no live access row
    ///
    /// Expired rows of the user are removed first. Returns `false` without
    /// writing anything when a live access row exists.
    async fn save_exclusive(
        &self,
        user_id: UserId,
        access: &NewSession,
        refresh: &NewSession,
        now: DateTime<Utc>,
    ) -> DatabaseResult<bool>;

    /// Insert an access row, leaving existing access rows in place
    async fn replace_access(&self, user_id: UserId, access: &NewSession) -> DatabaseResult<()>;

    /// Drop the user's access rows and insert `access` in their place
    async fn rotate_access(&self, user_id: UserId, access: &NewSession) -> DatabaseResult<()>;

    /// Upsert the user's refresh row
    async fn rotate_refresh(&self, user_id: UserId, refresh: &NewSession) -> DatabaseResult<()>;

    /// Replace both tokens of the user, but only if `presented` is still the live refresh uuid
    ///
    /// The refresh row is rewritten in place and the access rows are replaced
    /// in the same step. Returns `false` without writing anything when the
    /// presented refresh uuid has already been rotated away or has expired.
    async fn rotate_pair(
        &self,
        user_id: UserId,
        presented: Uuid,
        refresh: &NewSession,
        access: &NewSession,
        now: DateTime<Utc>,
    ) -> DatabaseResult<bool>;

    /// Remove every row of the user, returning how many were deleted
    async fn delete_user(&self, user_id: UserId) -> DatabaseResult<u64>;

    /// Remove every row whose expiry is before `now`
    async fn sweep_expired(&self, now: DateTime<Utc>) -> DatabaseResult<u64>;

    /// Count the user's live rows of one kind
    async fn count_active(
        &self,
        user_id: UserId,
        kind: TokenKind,
        now: DateTime<Utc>,
    ) -> DatabaseResult<i64>;

    /// Resolve a live session uuid to its owning user
    async fn find_user_by_session_uuid(
        &self,
        session_uuid: Uuid,
        user_id: UserId,
        kind: TokenKind,
        now: DateTime<Utc>,
    ) -> DatabaseResult<Option<UserId>>;

    /// The user's live rows, oldest first
    async fn list_active(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> DatabaseResult<Vec<SessionToken>>;
}

/// PostgreSQL-backed session store
#[derive(Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    /// Create a new session store
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

async fn insert_session(
    conn: &mut PgConnection,
    user_id: UserId,
    session: &NewSession,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO session_tokens (user_id, session_uuid, kind, expires_at)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(user_id)
    .bind(session.session_uuid)
    .bind(session.kind)
    .bind(session.expires_at)
    .execute(conn)
    .await?;

    Ok(())
}

async fn upsert_refresh(
    conn: &mut PgConnection,
    user_id: UserId,
    refresh: &NewSession,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO session_tokens (user_id, session_uuid, kind, expires_at)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (user_id) WHERE kind = 1
        DO UPDATE SET session_uuid = EXCLUDED.session_uuid,
                      expires_at = EXCLUDED.expires_at,
                      created_at = NOW()
        "#,
    )
    .bind(user_id)
    .bind(refresh.session_uuid)
    .bind(TokenKind::Refresh)
    .bind(refresh.expires_at)
    .execute(conn)
    .await?;

    Ok(())
}

/// Serialize concurrent cardinality decisions for one user until the transaction ends
async fn lock_user(conn: &mut PgConnection, user_id: UserId) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(user_id)
        .execute(conn)
        .await?;

    Ok(())
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn save(
        &self,
        user_id: UserId,
        access: &NewSession,
        refresh: &NewSession,
    ) -> DatabaseResult<()> {
        let mut tx = self.pool.begin().await?;
        insert_session(&mut tx, user_id, access).await?;
        upsert_refresh(&mut tx, user_id, refresh).await?;
        tx.commit().await?;

        Ok(())
    }

    async fn save_exclusive(
        &self,
        user_id: UserId,
        access: &NewSession,
        refresh: &NewSession,
        now: DateTime<Utc>,
    ) -> DatabaseResult<bool> {
        let mut tx = self.pool.begin().await?;
        lock_user(&mut tx, user_id).await?;

        sqlx::query("DELETE FROM session_tokens WHERE user_id = $1 AND expires_at < $2")
            .bind(user_id)
            .bind(now)
            .execute(&mut *tx)
            .await?;

        let active: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM session_tokens WHERE user_id = $1 AND kind = $2",
        )
        .bind(user_id)
        .bind(TokenKind::Access)
        .fetch_one(&mut *tx)
        .await?;

        if active > 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        insert_session(&mut tx, user_id, access).await?;
        upsert_refresh(&mut tx, user_id, refresh).await?;
        tx.commit().await?;

        Ok(true)
    }

    async fn replace_access(&self, user_id: UserId, access: &NewSession) -> DatabaseResult<()> {
        let mut conn = self.pool.acquire().await?;
        insert_session(&mut conn, user_id, access).await?;
        Ok(())
    }

    async fn rotate_access(&self, user_id: UserId, access: &NewSession) -> DatabaseResult<()> {
        let mut tx = self.pool.begin().await?;
        lock_user(&mut tx, user_id).await?;

        sqlx::query("DELETE FROM session_tokens WHERE user_id = $1 AND kind = $2")
            .bind(user_id)
            .bind(TokenKind::Access)
            .execute(&mut *tx)
            .await?;

        insert_session(&mut tx, user_id, access).await?;
        tx.commit().await?;

        Ok(())
    }

    async fn rotate_refresh(&self, user_id: UserId, refresh: &NewSession) -> DatabaseResult<()> {
        let mut conn = self.pool.acquire().await?;
        upsert_refresh(&mut conn, user_id, refresh).await?;
        Ok(())
    }

    async fn rotate_pair(
        &self,
        user_id: UserId,
        presented: Uuid,
        refresh: &NewSession,
        access: &NewSession,
        now: DateTime<Utc>,
    ) -> DatabaseResult<bool> {
        let mut tx = self.pool.begin().await?;
        lock_user(&mut tx, user_id).await?;

        let rotated = sqlx::query(
            r#"
            UPDATE session_tokens
            SET session_uuid = $3, expires_at = $4, created_at = NOW()
            WHERE user_id = $1 AND kind = $5 AND session_uuid = $2 AND expires_at >= $6
            "#,
        )
        .bind(user_id)
        .bind(presented)
        .bind(refresh.session_uuid)
        .bind(refresh.expires_at)
        .bind(TokenKind::Refresh)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if rotated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query("DELETE FROM session_tokens WHERE user_id = $1 AND kind = $2")
            .bind(user_id)
            .bind(TokenKind::Access)
            .execute(&mut *tx)
            .await?;

        insert_session(&mut tx, user_id, access).await?;
        tx.commit().await?;

        Ok(true)
    }

    async fn delete_user(&self, user_id: UserId) -> DatabaseResult<u64> {
        let result = sqlx::query("DELETE FROM session_tokens WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn sweep_expired(&self, now: DateTime<Utc>) -> DatabaseResult<u64> {
        let result = sqlx::query("DELETE FROM session_tokens WHERE expires_at < $1")
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn count_active(
        &self,
        user_id: UserId,
        kind: TokenKind,
        now: DateTime<Utc>,
    ) -> DatabaseResult<i64> {
        let count = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM session_tokens
            WHERE user_id = $1 AND kind = $2 AND expires_at >= $3
            "#,
        )
        .bind(user_id)
        .bind(kind)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn find_user_by_session_uuid(
        &self,
        session_uuid: Uuid,
        user_id: UserId,
        kind: TokenKind,
        now: DateTime<Utc>,
    ) -> DatabaseResult<Option<UserId>> {
        let found = sqlx::query_scalar(
            r#"
            SELECT user_id FROM session_tokens
            WHERE session_uuid = $1 AND user_id = $2 AND kind = $3 AND expires_at >= $4
            "#,
        )
        .bind(session_uuid)
        .bind(user_id)
        .bind(kind)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(found)
    }

    async fn list_active(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> DatabaseResult<Vec<SessionToken>> {
        let rows = sqlx::query_as::<_, SessionToken>(
            r#"
            SELECT id, user_id, session_uuid, kind, expires_at, created_at
            FROM session_tokens
            WHERE user_id = $1 AND expires_at >= $2
            ORDER BY id
            "#,
        )
        .bind(user_id)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    rows: Vec<SessionToken>,
    next_id: i64,
}

impl MemoryState {
    fn insert(&mut self, user_id: UserId, session: &NewSession, created_at: DateTime<Utc>) {
        self.next_id += 1;
        self.rows.push(SessionToken {
            id: self.next_id,
            user_id,
            session_uuid: session.session_uuid,
            kind: session.kind,
            expires_at: session.expires_at,
            created_at,
        });
    }

    fn upsert_refresh(&mut self, user_id: UserId, refresh: &NewSession, created_at: DateTime<Utc>) {
        match self
            .rows
            .iter_mut()
            .find(|row| row.user_id == user_id && row.kind == TokenKind::Refresh)
        {
            Some(row) => {
                row.session_uuid = refresh.session_uuid;
                row.expires_at = refresh.expires_at;
                row.created_at = created_at;
            }
            None => self.insert(
                user_id,
                &NewSession {
                    kind: TokenKind::Refresh,
                    ..refresh.clone()
                },
                created_at,
            ),
        }
    }
}

/// In-process session store
///
/// Mirrors the PostgreSQL store's semantics over a mutex-guarded table. Every
/// trait method takes the lock once, so each call is atomic on its own while
/// sequences of calls are not. Row timestamps come from the store's clock.
#[derive(Debug, Clone)]
pub struct MemorySessionStore {
    state: Arc<Mutex<MemoryState>>,
    clock: Arc<dyn Clock>,
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState::default())),
            clock,
        }
    }

    /// Every row, live or not
    pub async fn all_rows(&self) -> Vec<SessionToken> {
        self.state.lock().await.rows.clone()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn save(
        &self,
        user_id: UserId,
        access: &NewSession,
        refresh: &NewSession,
    ) -> DatabaseResult<()> {
        let mut state = self.state.lock().await;
        let created_at = self.clock.now();
        state.insert(user_id, access, created_at);
        state.upsert_refresh(user_id, refresh, created_at);
        Ok(())
    }

    async fn save_exclusive(
        &self,
        user_id: UserId,
        access: &NewSession,
        refresh: &NewSession,
        now: DateTime<Utc>,
    ) -> DatabaseResult<bool> {
        let mut state = self.state.lock().await;
        state
            .rows
            .retain(|row| row.user_id != user_id || row.is_active(now));

        let has_access = state
            .rows
            .iter()
            .any(|row| row.user_id == user_id && row.kind == TokenKind::Access);
        if has_access {
            return Ok(false);
        }

        state.insert(user_id, access, now);
        state.upsert_refresh(user_id, refresh, now);
        Ok(true)
    }

    async fn replace_access(&self, user_id: UserId, access: &NewSession) -> DatabaseResult<()> {
        self.state
            .lock()
            .await
            .insert(user_id, access, self.clock.now());
        Ok(())
    }

    async fn rotate_access(&self, user_id: UserId, access: &NewSession) -> DatabaseResult<()> {
        let mut state = self.state.lock().await;
        state
            .rows
            .retain(|row| row.user_id != user_id || row.kind != TokenKind::Access);
        state.insert(user_id, access, self.clock.now());
        Ok(())
    }

    async fn rotate_refresh(&self, user_id: UserId, refresh: &NewSession) -> DatabaseResult<()> {
        self.state
            .lock()
            .await
            .upsert_refresh(user_id, refresh, self.clock.now());
        Ok(())
    }

    async fn rotate_pair(
        &self,
        user_id: UserId,
        presented: Uuid,
        refresh: &NewSession,
        access: &NewSession,
        now: DateTime<Utc>,
    ) -> DatabaseResult<bool> {
        let mut state = self.state.lock().await;
        let created_at = self.clock.now();

        let Some(row) = state.rows.iter_mut().find(|row| {
            row.user_id == user_id
                && row.kind == TokenKind::Refresh
                && row.session_uuid == presented
                && row.is_active(now)
        }) else {
            return Ok(false);
        };
        row.session_uuid = refresh.session_uuid;
        row.expires_at = refresh.expires_at;
        row.created_at = created_at;

        state
            .rows
            .retain(|row| row.user_id != user_id || row.kind != TokenKind::Access);
        state.insert(user_id, access, created_at);
        Ok(true)
    }

    async fn delete_user(&self, user_id: UserId) -> DatabaseResult<u64> {
        let mut state = self.state.lock().await;
        let before = state.rows.len();
        state.rows.retain(|row| row.user_id != user_id);
        Ok((before - state.rows.len()) as u64)
    }

    async fn sweep_expired(&self, now: DateTime<Utc>) -> DatabaseResult<u64> {
        let mut state = self.state.lock().await;
        let before = state.rows.len();
        state.rows.retain(|row| row.is_active(now));

        let removed = (before - state.rows.len()) as u64;
        if removed > 0 {
            info!("Swept {} expired session rows", removed);
        }
        Ok(removed)
    }

    async fn count_active(
        &self,
        user_id: UserId,
        kind: TokenKind,
        now: DateTime<Utc>,
    ) -> DatabaseResult<i64> {
        let state = self.state.lock().await;
        let count = state
            .rows
            .iter()
            .filter(|row| row.user_id == user_id && row.kind == kind && row.is_active(now))
            .count();
        Ok(count as i64)
    }

    async fn find_user_by_session_uuid(
        &self,
        session_uuid: Uuid,
        user_id: UserId,
        kind: TokenKind,
        now: DateTime<Utc>,
    ) -> DatabaseResult<Option<UserId>> {
        let state = self.state.lock().await;
        Ok(state
            .rows
            .iter()
            .find(|row| {
                row.session_uuid == session_uuid
                    && row.user_id == user_id
                    && row.kind == kind
                    && row.is_active(now)
            })
            .map(|row| row.user_id))
    }

    async fn list_active(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> DatabaseResult<Vec<SessionToken>> {
        let state = self.state.lock().await;
        Ok(state
            .rows
            .iter()
            .filter(|row| row.user_id == user_id && row.is_active(now))
            .cloned()
            .collect())
    }
}
