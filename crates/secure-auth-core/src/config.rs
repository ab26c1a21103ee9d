//! Secure Auth configuration management
//!
//! Handles configuration from environment variables and TOML config files,
//! with defaults suitable for local development.
//!
//! Author: hephaex@gmail.com

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

const DEV_SECRET: &str = "development-secret-key-change-in-production";

/// Upper bound for token and session lifetimes (one year)
pub const MAX_LIFETIME_SECS: u64 = 365 * 24 * 3600;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,

    /// User directory (PostgreSQL) configuration
    pub database: DatabaseConfig,

    /// Session store configuration
    pub session: SessionConfig,

    /// Bearer token configuration
    pub token: TokenConfig,

    /// Password hashing parameters
    pub password: PasswordConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path,
            message: e.to_string(),
        })
    }

    /// Merge with environment variables (env takes precedence)
    pub fn with_env_override(mut self) -> Result<Self, ConfigError> {
        self.apply_env()?;
        Ok(self)
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        // Server
        if let Ok(host) = std::env::var("API_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("API_PORT") {
            self.server.port = parse_var("API_PORT", port)?;
        }
        if let Ok(env) = std::env::var("APP_ENV") {
            self.server.environment = env.parse()?;
        }
        if let Ok(origins) = std::env::var("CORS_ORIGINS") {
            self.server.cors_origins = origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        // PostgreSQL
        if let Ok(url) = std::env::var("DATABASE_URL") {
            self.database.url = Some(url);
        }
        if let Ok(size) = std::env::var("DATABASE_POOL_SIZE") {
            self.database.pool_size = parse_var("DATABASE_POOL_SIZE", size)?;
        }
        if let Ok(attempts) = std::env::var("DATABASE_CONNECT_ATTEMPTS") {
            self.database.connect_attempts = parse_var("DATABASE_CONNECT_ATTEMPTS", attempts)?;
        }

        // Sessions
        if let Ok(ttl) = std::env::var("SESSION_TTL_SECS") {
            self.session.ttl_secs = parse_var("SESSION_TTL_SECS", ttl)?;
        }

        // Tokens
        if let Ok(secret) = std::env::var("JWT_SECRET") {
            self.token.secret = secret;
        }
        if let Ok(exp) = std::env::var("JWT_EXPIRATION_SECS") {
            self.token.expiration_secs = parse_var("JWT_EXPIRATION_SECS", exp)?;
        }
        if let Ok(issuer) = std::env::var("JWT_ISSUER") {
            self.token.issuer = issuer;
        }
        if let Ok(audience) = std::env::var("JWT_AUDIENCE") {
            self.token.audience = audience;
        }

        // Logging
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(json) = std::env::var("LOG_JSON") {
            self.logging.json_format = parse_var("LOG_JSON", json)?;
        }

        Ok(())
    }

    /// Reject configurations the authentication core cannot run safely with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.token.secret.is_empty() {
            return Err(ConfigError::MissingRequired("JWT_SECRET".to_string()));
        }
        if self.server.environment.is_production() {
            if self.token.secret.len() < 32 {
                return Err(ConfigError::InvalidValue {
                    key: "JWT_SECRET".to_string(),
                    value: "<at least 32 bytes required in production>".to_string(),
                });
            }
            if self.token.secret == DEV_SECRET {
                return Err(ConfigError::InvalidValue {
                    key: "JWT_SECRET".to_string(),
                    value: "<development secret>".to_string(),
                });
            }
        }
        if self.token.expiration_secs == 0 || self.token.expiration_secs > MAX_LIFETIME_SECS {
            return Err(ConfigError::InvalidValue {
                key: "JWT_EXPIRATION_SECS".to_string(),
                value: self.token.expiration_secs.to_string(),
            });
        }
        if self.session.ttl_secs == 0 || self.session.ttl_secs > MAX_LIFETIME_SECS {
            return Err(ConfigError::InvalidValue {
                key: "SESSION_TTL_SECS".to_string(),
                value: self.session.ttl_secs.to_string(),
            });
        }
        if self.session.cache_timeout_ms == 0
            || self.database.query_timeout_ms == 0
            || self.server.request_timeout_secs == 0
        {
            return Err(ConfigError::InvalidValue {
                key: "timeout".to_string(),
                value: "0".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: String) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value,
    })
}

/// Deployment environment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

impl std::str::FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            _ => Err(ConfigError::InvalidValue {
                key: "APP_ENV".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Deployment environment (controls the cookie `Secure` flag)
    pub environment: Environment,

    /// Allowed origins for CORS
    pub cors_origins: Vec<String>,

    /// Request timeout in seconds
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
            environment: Environment::Development,
            // Empty by default - set via CORS_ORIGINS env var
            cors_origins: vec![],
            request_timeout_secs: 30,
        }
    }
}

/// User directory connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL. `None` selects the in-memory directory.
    pub url: Option<String>,

    /// Connection pool size
    pub pool_size: u32,

    /// Idle connection lifetime in seconds
    pub max_idle_secs: u64,

    /// Connection attempts at startup before giving up
    pub connect_attempts: u32,

    /// Fixed delay between connection attempts in seconds
    pub connect_backoff_secs: u64,

    /// Upper bound for every directory call in milliseconds
    pub query_timeout_ms: u64,
}

impl DatabaseConfig {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            pool_size: 20,
            max_idle_secs: 600,
            connect_attempts: 10,
            connect_backoff_secs: 2,
            query_timeout_ms: 3000,
        }
    }
}

/// Session store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Absolute session lifetime in seconds
    pub ttl_secs: u64,

    /// Namespace prepended to cache keys (`<prefix>_<session id>`)
    pub key_prefix: String,

    /// Upper bound for every cache call in milliseconds
    pub cache_timeout_ms: u64,
}

impl SessionConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn cache_timeout(&self) -> Duration {
        Duration::from_millis(self.cache_timeout_ms)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 24 * 3600,
            key_prefix: "session".to_string(),
            cache_timeout_ms: 500,
        }
    }
}

/// Bearer token configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    /// Secret key for HMAC signing
    pub secret: String,

    /// Token lifetime in seconds
    pub expiration_secs: u64,

    /// `iss` claim
    pub issuer: String,

    /// `aud` claim
    pub audience: String,

    /// Name of the cookie carrying the token
    pub cookie_name: String,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            secret: DEV_SECRET.to_string(),
            expiration_secs: 24 * 3600,
            issuer: "secure-auth".to_string(),
            audience: "secure-auth".to_string(),
            cookie_name: "session_token".to_string(),
        }
    }
}

/// Argon2id cost parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PasswordConfig {
    /// Memory cost in KiB (default: 19456 = 19 MiB)
    pub memory_cost: u32,
    /// Iterations
    pub time_cost: u32,
    /// Lanes
    pub parallelism: u32,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        // OWASP minimum recommendation for Argon2id
        Self {
            memory_cost: 19456,
            time_cost: 2,
            parallelism: 1,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level or filter directive (trace, debug, info, warn, error)
    pub level: String,

    /// JSON format for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}
