//! Server-side session records
//!
//! Sessions live in a [`KeyValueCache`] under `<prefix>_<session id>` and
//! expire through the cache's time-to-live. There is no
//! refresh operation: `last_seen_at` is written once, so the TTL is an
//! absolute session lifetime rather than a sliding idle timeout.

use super::bounded;
use async_trait::async_trait;
use secure_auth_core::{CacheError, KeyValueCache, Session, SessionConfig, SessionId, UserId};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Session store errors
#[derive(Debug, Error)]
pub enum SessionError {
    /// Never existed, expired, or unreadable
    #[error("Session not found")]
    NotFound,

    #[error("Session backend error: {0}")]
    Backend(#[from] CacheError),

    #[error("Failed to encode session: {0}")]
    Encoding(String),
}

/// Revocable server-side record of valid sessions
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Create and persist a new session for `user_id`
    async fn create(
        &self,
        user_id: UserId,
        ip_address: &str,
        user_agent: &str,
    ) -> Result<Session, SessionError>;

    /// Load a live session
    async fn get(&self, session_id: SessionId) -> Result<Session, SessionError>;

    /// Remove a session. Idempotent.
    async fn delete(&self, session_id: SessionId) -> Result<(), SessionError>;
}

/// Session store over any key-value cache
pub struct CacheSessionStore {
    cache: Arc<dyn KeyValueCache>,
    prefix: String,
    ttl: Duration,
    call_timeout: Duration,
}

impl CacheSessionStore {
    pub fn new(
        cache: Arc<dyn KeyValueCache>,
        prefix: impl Into<String>,
        ttl: Duration,
        call_timeout: Duration,
    ) -> Self {
        Self {
            cache,
            prefix: prefix.into(),
            ttl,
            call_timeout,
        }
    }

    pub fn from_config(cache: Arc<dyn KeyValueCache>, config: &SessionConfig) -> Self {
        Self::new(
            cache,
            config.key_prefix.clone(),
            config.ttl(),
            config.cache_timeout(),
        )
    }

    fn key(&self, session_id: SessionId) -> String {
        format!("{}_{}", self.prefix, session_id)
    }
}

#[async_trait]
impl SessionStore for CacheSessionStore {
    async fn create(
        &self,
        user_id: UserId,
        ip_address: &str,
        user_agent: &str,
    ) -> Result<Session, SessionError> {
        let session = Session::new(user_id, ip_address, user_agent);
        let data =
            serde_json::to_vec(&session).map_err(|e| SessionError::Encoding(e.to_string()))?;

        let key = self.key(session.session_id);
        bounded(self.call_timeout, self.cache.set(&key, data, self.ttl), || {
            CacheError::Timeout(self.call_timeout)
        })
        .await?;

        tracing::debug!(session_id = %session.session_id, user_id = %user_id, "Session created");
        Ok(session)
    }

    async fn get(&self, session_id: SessionId) -> Result<Session, SessionError> {
        let key = self.key(session_id);
        let data = bounded(self.call_timeout, self.cache.get(&key), || {
            CacheError::Timeout(self.call_timeout)
        })
        .await?
        .ok_or(SessionError::NotFound)?;

        serde_json::from_slice(&data).map_err(|e| {
            tracing::warn!(session_id = %session_id, error = %e, "Discarding undecodable session record");
            SessionError::NotFound
        })
    }

    async fn delete(&self, session_id: SessionId) -> Result<(), SessionError> {
        let key = self.key(session_id);
        bounded(self.call_timeout, self.cache.del(&key), || {
            CacheError::Timeout(self.call_timeout)
        })
        .await?;

        tracing::debug!(session_id = %session_id, "Session deleted");
        Ok(())
    }
}
