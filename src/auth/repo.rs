use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::repo_types::{NewUser, Role, User};

/// Returned (inside `anyhow::Error`) by [`UserDirectory::create`] when the email is taken.
#[derive(Debug, Error)]
#[error("email already registered")]
pub struct DuplicateEmail;

/// The `Users` collection: profiles resolved by session identity.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>>;
    async fn create(&self, user: NewUser) -> anyhow::Result<User>;
    async fn list(&self) -> anyhow::Result<Vec<User>>;
    async fn set_role(&self, id: Uuid, role: Role) -> anyhow::Result<Option<User>>;
    async fn count(&self) -> anyhow::Result<i64>;
}

const USER_COLUMNS: &str = "id, email, password_hash, first_name, last_name, role, created_at";

pub struct PgUsers {
    db: PgPool,
}

impl PgUsers {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserDirectory for PgUsers {
    /// Find a user by email.
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    /// Create a new user with hashed password.
    async fn create(&self, user: NewUser) -> anyhow::Result<User> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (email, password_hash, first_name, last_name, role)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(user.email)
        .bind(user.password_hash)
        .bind(user.first_name)
        .bind(user.last_name)
        .bind(user.role)
        .fetch_one(&self.db)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => DuplicateEmail.into(),
            _ => anyhow::Error::from(e),
        })?;
        Ok(user)
    }

    async fn list(&self) -> anyhow::Result<Vec<User>> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY last_name, first_name, email"
        ))
        .fetch_all(&self.db)
        .await?;
        Ok(users)
    }

    async fn set_role(&self, id: Uuid, role: Role) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET role = $2 WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(role)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn count(&self) -> anyhow::Result<i64> {
        let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(&self.db)
            .await?;
        Ok(n)
    }
}

/// Signed-out sessions, kept until their last refresh token would have expired.
#[async_trait]
pub trait RevocationStore: Send + Sync {
    async fn record(&self, session_id: Uuid, until: OffsetDateTime) -> anyhow::Result<()>;
    /// Revocations still in force at `now`.
    async fn active(&self, now: OffsetDateTime) -> anyhow::Result<Vec<(Uuid, OffsetDateTime)>>;
    /// Drops revocations that lapsed before `now`; returns how many went.
    async fn prune(&self, now: OffsetDateTime) -> anyhow::Result<u64>;
}

pub struct PgRevocations {
    db: PgPool,
}

impl PgRevocations {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl RevocationStore for PgRevocations {
    async fn record(&self, session_id: Uuid, until: OffsetDateTime) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO revoked_sessions (session_id, expires_at)
            VALUES ($1, $2)
            ON CONFLICT (session_id) DO UPDATE SET expires_at = GREATEST(revoked_sessions.expires_at, EXCLUDED.expires_at)
            "#,
        )
        .bind(session_id)
        .bind(until)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn active(&self, now: OffsetDateTime) -> anyhow::Result<Vec<(Uuid, OffsetDateTime)>> {
        let rows = sqlx::query_as::<_, (Uuid, OffsetDateTime)>(
            "SELECT session_id, expires_at FROM revoked_sessions WHERE expires_at > $1",
        )
        .bind(now)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn prune(&self, now: OffsetDateTime) -> anyhow::Result<u64> {
        let done = sqlx::query("DELETE FROM revoked_sessions WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.db)
            .await?;
        Ok(done.rows_affected())
    }
}
