//! Application state management
//!
//! Author: hephaex@gmail.com

use crate::auth::{
    AuthPipeline, AuthService, CacheSessionStore, JwtCodec, PasswordError, PasswordHasher,
    SessionStore, TokenCodec,
};
use secure_auth_core::{AppConfig, InMemoryUserDirectory, KeyValueCache, MokaCache, UserDirectory};
use std::sync::Arc;
use std::time::Instant;

/// Application state shared across handlers
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,
    /// Registration, login and logout flows
    pub auth: AuthService,
    /// Per-request authentication decision
    pub pipeline: AuthPipeline,
    /// Server start time
    pub start_time: Instant,
}

impl AppState {
    /// Wire the authentication core over the given stores
    pub fn new(
        config: AppConfig,
        directory: Arc<dyn UserDirectory>,
        cache: Arc<dyn KeyValueCache>,
    ) -> Result<Self, PasswordError> {
        let sessions: Arc<dyn SessionStore> =
            Arc::new(CacheSessionStore::from_config(cache, &config.session));
        let tokens: Arc<dyn TokenCodec> = Arc::new(JwtCodec::new(&config.token));
        let hasher = PasswordHasher::new(&config.password)?;
        let directory_timeout = config.database.query_timeout();

        let pipeline = AuthPipeline::new(
            tokens.clone(),
            sessions.clone(),
            directory.clone(),
            directory_timeout,
        );
        let auth = AuthService::new(
            directory,
            sessions,
            tokens,
            hasher,
            config.token.clone(),
            directory_timeout,
        )?;

        Ok(Self {
            config,
            auth,
            pipeline,
            start_time: Instant::now(),
        })
    }

    /// State over the in-memory directory and an in-process session cache
    pub fn in_memory(config: AppConfig) -> Result<Self, PasswordError> {
        let cache = Arc::new(MokaCache::new());
        Self::new(config, Arc::new(InMemoryUserDirectory::new()), cache)
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Whether cookies must carry the `Secure` attribute
    pub fn secure_cookies(&self) -> bool {
        self.config.server.environment.is_production()
    }
}
