//! Secure Auth Core - Domain models, store contracts and shared types
//!
//! This crate defines the abstractions the authentication core is built on:
//! - Identity models (users, user ids, session ids)
//! - The `UserDirectory` contract for durable user records
//! - The `KeyValueCache` contract backing the session store
//! - Configuration management
//!
//! Author: hephaex@gmail.com

pub mod cache;
pub mod config;
pub mod directory;

pub use cache::{CacheError, CacheStats, KeyValueCache, MokaCache};
pub use config::{
    AppConfig, ConfigError, DatabaseConfig, Environment, LoggingConfig, PasswordConfig,
    ServerConfig, SessionConfig, TokenConfig,
};
pub use directory::{DirectoryError, InMemoryUserDirectory, PgUserDirectory, UserDirectory};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

/// Numeric user identifier assigned by the user directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UserId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(UserId)
    }
}

/// 128-bit random session identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Generate a fresh random session id
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(SessionId)
    }
}

// ============================================================================
// Users
// ============================================================================

/// Durable user record
///
/// The password hash is an opaque PHC string. It is skipped during
/// serialization so a `User` can never leak it across the network boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Fields required to insert a new user
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
}

// ============================================================================
// Sessions
// ============================================================================

/// Server-side session record
///
/// The serialized field set (`session_id`, `user_id`, `ip`, `user_agent`,
/// `created_at`, `last_seen_at`) is persisted in the cache and must stay
/// stable across releases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: SessionId,
    pub user_id: UserId,
    #[serde(rename = "ip")]
    pub ip_address: String,
    pub user_agent: String,
    pub created_at: DateTime<Utc>,
    /// Written once at creation. Sessions are never refreshed.
    pub last_seen_at: DateTime<Utc>,
}

impl Session {
    /// Build a new session record for `user_id` with a random id
    pub fn new(user_id: UserId, ip_address: impl Into<String>, user_agent: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: SessionId::generate(),
            user_id,
            ip_address: ip_address.into(),
            user_agent: user_agent.into(),
            created_at: now,
            last_seen_at: now,
        }
    }
}
