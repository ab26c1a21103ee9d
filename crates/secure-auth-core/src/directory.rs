//! User directory
//!
//! Durable user records behind the [`UserDirectory`] contract. The
//! PostgreSQL implementation relies on a database-level unique constraint
//! for email uniqueness, so two concurrent registrations of the same email
//! cannot both succeed. Expected schema:
//!
//! ```sql
//! CREATE TABLE users (
//!     id            BIGSERIAL PRIMARY KEY,
//!     email         TEXT NOT NULL CONSTRAINT users_email_key UNIQUE,
//!     password_hash TEXT NOT NULL,
//!     created_at    TIMESTAMPTZ NOT NULL DEFAULT NOW()
//! );
//! ```
//!
//! Author: hephaex@gmail.com

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::config::DatabaseConfig;
use crate::{NewUser, User, UserId};

/// User directory errors
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("Email already exists")]
    DuplicateEmail,

    #[error("User not found")]
    NotFound,

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Directory call timed out after {0:?}")]
    Timeout(Duration),
}

/// Durable storage for user records
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Insert a user. Fails with `DuplicateEmail` when the email is taken.
    async fn create(&self, new_user: NewUser) -> Result<User, DirectoryError>;

    /// Look up a user by exact (case-sensitive) email
    async fn get_by_email(&self, email: &str) -> Result<User, DirectoryError>;

    /// Look up a user by id
    async fn get_by_id(&self, id: UserId) -> Result<User, DirectoryError>;
}

// ============================================================================
// PostgreSQL
// ============================================================================

/// PostgreSQL user directory
pub struct PgUserDirectory {
    pool: PgPool,
}

#[derive(Debug, FromRow)]
struct UserRow {
    id: i64,
    email: String,
    password_hash: String,
    created_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: UserId(row.id),
            email: row.email,
            password_hash: row.password_hash,
            created_at: row.created_at,
        }
    }
}

impl PgUserDirectory {
    /// Open a connection pool and verify the database is reachable
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, DirectoryError> {
        let url = config
            .url
            .as_deref()
            .ok_or_else(|| DirectoryError::Persistence("DATABASE_URL is not set".to_string()))?;

        let pool = PgPoolOptions::new()
            .max_connections(config.pool_size)
            .idle_timeout(Duration::from_secs(config.max_idle_secs))
            .acquire_timeout(config.query_timeout())
            .connect(url)
            .await
            .map_err(|e| DirectoryError::Persistence(format!("PostgreSQL connection failed: {e}")))?;

        Ok(Self { pool })
    }

    /// Connect with a bounded number of attempts and a fixed backoff
    pub async fn connect_with_retry(config: &DatabaseConfig) -> Result<Self, DirectoryError> {
        let attempts = config.connect_attempts.max(1);
        let backoff = Duration::from_secs(config.connect_backoff_secs);
        let mut attempt = 1;

        loop {
            match Self::connect(config).await {
                Ok(directory) => {
                    tracing::info!(attempt, "Connected to user directory");
                    return Ok(directory);
                }
                Err(e) if attempt < attempts => {
                    tracing::warn!(attempt, attempts, error = %e, "User directory unreachable, retrying");
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => {
                    tracing::error!(attempts, error = %e, "Giving up on user directory");
                    return Err(e);
                }
            }
        }
    }

    /// Create from an existing pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

const EMAIL_CONSTRAINT: &str = "users_email_key";

/// Only a violation of the email constraint means the email is taken
fn is_email_conflict(unique_violation: bool, constraint: Option<&str>) -> bool {
    unique_violation && constraint == Some(EMAIL_CONSTRAINT)
}

fn map_insert_error(err: sqlx::Error) -> DirectoryError {
    match &err {
        sqlx::Error::Database(db) if is_email_conflict(db.is_unique_violation(), db.constraint()) => {
            DirectoryError::DuplicateEmail
        }
        _ => DirectoryError::Persistence(err.to_string()),
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn create(&self, new_user: NewUser) -> Result<User, DirectoryError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            INSERT INTO users (email, password_hash)
            VALUES ($1, $2)
            RETURNING id, email, password_hash, created_at
            "#,
        )
        .bind(&new_user.email)
        .bind(&new_user.password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(map_insert_error)?;

        Ok(row.into())
    }

    async fn get_by_email(&self, email: &str) -> Result<User, DirectoryError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, email, password_hash, created_at FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DirectoryError::Persistence(e.to_string()))?;

        row.map(User::from).ok_or(DirectoryError::NotFound)
    }

    async fn get_by_id(&self, id: UserId) -> Result<User, DirectoryError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, email, password_hash, created_at FROM users WHERE id = $1",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DirectoryError::Persistence(e.to_string()))?;

        row.map(User::from).ok_or(DirectoryError::NotFound)
    }
}

// ============================================================================
// In-memory
// ============================================================================

#[derive(Default)]
struct DirectoryState {
    next_id: i64,
    users: HashMap<i64, User>,
    by_email: HashMap<String, i64>,
}

/// In-memory user directory for development and tests
///
/// Uniqueness is checked and the insert performed under one write lock, so
/// it gives the same guarantee as the database constraint.
#[derive(Default)]
pub struct InMemoryUserDirectory {
    state: RwLock<DirectoryState>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored users
    pub async fn len(&self) -> usize {
        self.state.read().await.users.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Remove a user, leaving any of their live sessions dangling
    pub async fn remove(&self, id: UserId) -> Option<User> {
        let mut state = self.state.write().await;
        let user = state.users.remove(&id.0)?;
        state.by_email.remove(&user.email);
        Some(user)
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn create(&self, new_user: NewUser) -> Result<User, DirectoryError> {
        let mut state = self.state.write().await;

        if state.by_email.contains_key(&new_user.email) {
            return Err(DirectoryError::DuplicateEmail);
        }

        state.next_id += 1;
        let user = User {
            id: UserId(state.next_id),
            email: new_user.email,
            password_hash: new_user.password_hash,
            created_at: Utc::now(),
        };
        state.by_email.insert(user.email.clone(), user.id.0);
        state.users.insert(user.id.0, user.clone());

        Ok(user)
    }

    async fn get_by_email(&self, email: &str) -> Result<User, DirectoryError> {
        let state = self.state.read().await;
        state
            .by_email
            .get(email)
            .and_then(|id| state.users.get(id))
            .cloned()
            .ok_or(DirectoryError::NotFound)
    }

    async fn get_by_id(&self, id: UserId) -> Result<User, DirectoryError> {
        self.state
            .read()
            .await
            .users
            .get(&id.0)
            .cloned()
            .ok_or(DirectoryError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            email: email.to_string(),
            password_hash: "$argon2id$v=19$hash".to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_and_lookup() {
        let directory = InMemoryUserDirectory::new();
        let user = directory.create(new_user("a@x.com")).await.unwrap();

        assert_eq!(user.id, UserId(1));
        assert_eq!(directory.get_by_email("a@x.com").await.unwrap(), user);
        assert_eq!(directory.get_by_id(user.id).await.unwrap(), user);
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let directory = InMemoryUserDirectory::new();
        directory.create(new_user("a@x.com")).await.unwrap();

        let second = directory.create(new_user("a@x.com")).await;
        assert!(matches!(second, Err(DirectoryError::DuplicateEmail)));
        assert_eq!(directory.len().await, 1);
    }

    #[tokio::test]
    async fn test_email_is_case_sensitive() {
        let directory = InMemoryUserDirectory::new();
        directory.create(new_user("a@x.com")).await.unwrap();

        assert!(directory.create(new_user("A@x.com")).await.is_ok());
        assert!(matches!(
            directory.get_by_email("A@X.COM").await,
            Err(DirectoryError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_missing_user() {
        let directory = InMemoryUserDirectory::new();
        assert!(matches!(
            directory.get_by_id(UserId(99)).await,
            Err(DirectoryError::NotFound)
        ));
        assert!(directory.remove(UserId(99)).await.is_none());
    }

    #[test]
    fn test_only_email_constraint_is_duplicate() {
        assert!(is_email_conflict(true, Some("users_email_key")));
        assert!(!is_email_conflict(true, Some("users_username_key")));
        assert!(!is_email_conflict(true, None));
        assert!(!is_email_conflict(false, Some("users_email_key")));
    }

    #[tokio::test]
    async fn test_concurrent_registrations_single_winner() {
        let directory = Arc::new(InMemoryUserDirectory::new());

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let directory = Arc::clone(&directory);
                tokio::spawn(async move { directory.create(new_user("race@x.com")).await })
            })
            .collect();

        let mut created = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                created += 1;
            }
        }

        assert_eq!(created, 1);
        assert_eq!(directory.len().await, 1);
    }

    #[tokio::test]
    async fn test_connect_requires_url() {
        let config = DatabaseConfig::default();
        let result = PgUserDirectory::connect(&config).await;
        assert!(matches!(result, Err(DirectoryError::Persistence(_))));
    }
}
