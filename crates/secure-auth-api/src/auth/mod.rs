//! Authentication core
//!
//! - Password hashing with Argon2id
//! - Signed bearer tokens bound to a session
//! - Revocable server-side sessions
//! - The per-request authentication pipeline
//! - Registration, login and logout flows
//!
//! Author: hephaex@gmail.com

pub mod cookie;
pub mod jwt;
pub mod middleware;
pub mod models;
pub mod password;
pub mod service;
pub mod session;

pub use jwt::{Claims, JwtCodec, TokenCodec, TokenError};
pub use middleware::{auth_middleware, AuthFailure, AuthPipeline};
pub use models::{AuthContext, LoginOutcome, LoginRequest, MessageResponse, RegisterRequest, UserInfo};
pub use password::{PasswordError, PasswordHasher};
pub use service::AuthService;
pub use session::{CacheSessionStore, SessionError, SessionStore};

use std::future::Future;
use std::time::Duration;

/// Await `fut` for at most `limit`, mapping an elapsed deadline through
/// `on_timeout`. The inner future is dropped when the deadline passes.
pub(crate) async fn bounded<T, E, F>(
    limit: Duration,
    fut: F,
    on_timeout: impl FnOnce() -> E,
) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(on_timeout()),
    }
}
