//! Authentication service layer
//!
//! Registration, login and logout flows. Collaborator errors are
//! translated here into [`AppError`] kinds so raw storage or codec errors
//! never reach the network boundary.

use super::bounded;
use super::jwt::{Claims, TokenCodec};
use super::models::{LoginOutcome, LoginRequest, RegisterRequest};
use super::password::{PasswordError, PasswordHasher};
use super::session::SessionStore;
use crate::audit::{audit_log, AuditEvent, ClientInfo};
use crate::error::AppError;
use secure_auth_core::{DirectoryError, NewUser, Session, TokenConfig, User, UserDirectory};
use std::sync::Arc;
use std::time::Duration;
use validator::Validate;

/// Authentication service
pub struct AuthService {
    directory: Arc<dyn UserDirectory>,
    sessions: Arc<dyn SessionStore>,
    tokens: Arc<dyn TokenCodec>,
    hasher: PasswordHasher,
    token_config: TokenConfig,
    directory_timeout: Duration,
    /// Verified against when the email is unknown, so both login failure
    /// paths cost one hash computation
    decoy_hash: String,
}

impl AuthService {
    pub fn new(
        directory: Arc<dyn UserDirectory>,
        sessions: Arc<dyn SessionStore>,
        tokens: Arc<dyn TokenCodec>,
        hasher: PasswordHasher,
        token_config: TokenConfig,
        directory_timeout: Duration,
    ) -> Result<Self, PasswordError> {
        let decoy_hash = hasher.hash("decoy-password-never-matches")?;

        Ok(Self {
            directory,
            sessions,
            tokens,
            hasher,
            token_config,
            directory_timeout,
            decoy_hash,
        })
    }

    /// Register a new user
    ///
    /// Email uniqueness is left to the directory's atomic insert; there is
    /// no lookup beforehand.
    pub async fn register(
        &self,
        request: RegisterRequest,
        client: &ClientInfo,
    ) -> Result<User, AppError> {
        request.validate()?;

        let password_hash = self.hash_password(request.password).await?;

        let created = bounded(
            self.directory_timeout,
            self.directory.create(NewUser {
                email: request.email.clone(),
                password_hash,
            }),
            || DirectoryError::Timeout(self.directory_timeout),
        )
        .await;

        match created {
            Ok(user) => {
                audit_log(&AuditEvent::RegistrationSuccess {
                    user_id: user.id,
                    email: user.email.clone(),
                    ip_address: client.ip_address.clone(),
                    user_agent: client.user_agent.clone(),
                });
                Ok(user)
            }
            Err(e) => {
                audit_log(&AuditEvent::RegistrationFailure {
                    email: request.email,
                    reason: e.to_string(),
                    ip_address: client.ip_address.clone(),
                    user_agent: client.user_agent.clone(),
                });
                match e {
                    DirectoryError::DuplicateEmail => Err(AppError::DuplicateEmail),
                    other => Err(AppError::Internal(format!("Failed to create user: {other}"))),
                }
            }
        }
    }

    /// Verify credentials, open a session and mint its token
    ///
    /// Unknown email and wrong password produce the same error.
    pub async fn login(
        &self,
        request: LoginRequest,
        client: &ClientInfo,
    ) -> Result<LoginOutcome, AppError> {
        request.validate()?;

        let lookup = bounded(
            self.directory_timeout,
            self.directory.get_by_email(&request.email),
            || DirectoryError::Timeout(self.directory_timeout),
        )
        .await;

        let user = match lookup {
            Ok(user) => Some(user),
            Err(DirectoryError::NotFound) => None,
            Err(e) => return Err(AppError::Internal(format!("Failed to look up user: {e}"))),
        };

        let stored_hash = user
            .as_ref()
            .map(|u| u.password_hash.clone())
            .unwrap_or_else(|| self.decoy_hash.clone());

        let verified = match self.verify_password(request.password, stored_hash).await? {
            Ok(matches) => matches,
            Err(e) => {
                tracing::error!(email = %request.email, error = %e, "Stored password hash is unusable");
                false
            }
        };

        let user = match (user, verified) {
            (Some(user), true) => user,
            (user, _) => {
                let reason = if user.is_some() {
                    "password mismatch"
                } else {
                    "unknown email"
                };
                audit_log(&AuditEvent::LoginFailure {
                    email: request.email,
                    reason: reason.to_string(),
                    ip_address: client.ip_address.clone(),
                    user_agent: client.user_agent.clone(),
                });
                return Err(AppError::InvalidCredentials);
            }
        };

        let session = self
            .sessions
            .create(user.id, client.ip_or_empty(), client.user_agent_or_empty())
            .await
            .map_err(|e| AppError::Internal(format!("Failed to create session: {e}")))?;

        let claims = Claims::for_session(user.id, session.session_id, &self.token_config);
        let token = match self.tokens.issue(&claims) {
            Ok(token) => token,
            Err(e) => {
                // Do not leave a session behind that no token refers to
                self.discard_session(&session).await;
                return Err(AppError::Internal(format!("Failed to issue token: {e}")));
            }
        };

        audit_log(&AuditEvent::LoginSuccess {
            user_id: user.id,
            session_id: session.session_id,
            email: user.email.clone(),
            ip_address: client.ip_address.clone(),
            user_agent: client.user_agent.clone(),
        });

        Ok(LoginOutcome {
            token,
            user,
            session,
        })
    }

    /// End a session. Never fails.
    pub async fn logout(&self, session: &Session, client: &ClientInfo) {
        self.discard_session(session).await;

        audit_log(&AuditEvent::Logout {
            user_id: session.user_id,
            session_id: session.session_id,
            ip_address: client.ip_address.clone(),
        });
    }

    pub fn token_config(&self) -> &TokenConfig {
        &self.token_config
    }

    async fn discard_session(&self, session: &Session) {
        if let Err(e) = self.sessions.delete(session.session_id).await {
            tracing::warn!(
                session_id = %session.session_id,
                error = %e,
                "Failed to delete session"
            );
        }
    }

    async fn hash_password(&self, password: String) -> Result<String, AppError> {
        let hasher = self.hasher.clone();
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| AppError::Internal(format!("Hashing task failed: {e}")))?
            .map_err(|e| AppError::Internal(e.to_string()))
    }

    async fn verify_password(
        &self,
        password: String,
        hash: String,
    ) -> Result<Result<bool, PasswordError>, AppError> {
        let hasher = self.hasher.clone();
        tokio::task::spawn_blocking(move || hasher.verify(&password, &hash))
            .await
            .map_err(|e| AppError::Internal(format!("Verification task failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::JwtCodec;
    use crate::auth::password::test_hasher;
    use crate::auth::session::CacheSessionStore;
    use async_trait::async_trait;
    use secure_auth_core::{InMemoryUserDirectory, MokaCache, UserId};

    struct Fixture {
        service: AuthService,
        directory: Arc<InMemoryUserDirectory>,
        sessions: Arc<CacheSessionStore>,
        tokens: Arc<JwtCodec>,
    }

    fn fixture() -> Fixture {
        let directory = Arc::new(InMemoryUserDirectory::new());
        let sessions = Arc::new(CacheSessionStore::new(
            Arc::new(MokaCache::new()),
            "session",
            Duration::from_secs(60),
            Duration::from_millis(200),
        ));
        let tokens = Arc::new(JwtCodec::new(&TokenConfig::default()));
        let service = AuthService::new(
            directory.clone(),
            sessions.clone(),
            tokens.clone(),
            test_hasher(),
            TokenConfig::default(),
            Duration::from_millis(500),
        )
        .unwrap();

        Fixture {
            service,
            directory,
            sessions,
            tokens,
        }
    }

    fn register_request(email: &str, password: &str) -> RegisterRequest {
        RegisterRequest {
            email: email.to_string(),
            password: password.to_string(),
        }
    }

    fn login_request(email: &str, password: &str) -> LoginRequest {
        LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        }
    }

    #[tokio::test]
    async fn test_register_then_login() {
        let fx = fixture();
        let client = ClientInfo::default();

        let user = fx
            .service
            .register(register_request("a@x.com", "pw123"), &client)
            .await
            .unwrap();
        assert_ne!(user.password_hash, "pw123");
        assert!(user.password_hash.starts_with("$argon2id$"));

        let outcome = fx
            .service
            .login(login_request("a@x.com", "pw123"), &client)
            .await
            .unwrap();

        let claims = fx.tokens.verify(&outcome.token).unwrap();
        assert_eq!(claims.user_id().unwrap(), user.id);
        assert_eq!(claims.session_id().unwrap(), outcome.session.session_id);
        assert!(fx.sessions.get(outcome.session.session_id).await.is_ok());
    }

    #[tokio::test]
    async fn test_duplicate_registration() {
        let fx = fixture();
        let client = ClientInfo::default();

        fx.service
            .register(register_request("a@x.com", "pw123"), &client)
            .await
            .unwrap();
        let second = fx
            .service
            .register(register_request("a@x.com", "other"), &client)
            .await;

        assert!(matches!(second, Err(AppError::DuplicateEmail)));
        assert_eq!(fx.directory.len().await, 1);
    }

    #[tokio::test]
    async fn test_invalid_registration_input() {
        let fx = fixture();
        let result = fx
            .service
            .register(register_request("not-an-email", ""), &ClientInfo::default())
            .await;

        match result {
            Err(AppError::Validation(fields)) => {
                assert!(fields.contains_key("email"));
                assert!(fields.contains_key("password"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
        assert!(fx.directory.is_empty().await);
    }

    #[tokio::test]
    async fn test_wrong_password_and_unknown_email_are_indistinguishable() {
        let fx = fixture();
        let client = ClientInfo::default();
        fx.service
            .register(register_request("a@x.com", "pw123"), &client)
            .await
            .unwrap();

        let wrong_password = fx
            .service
            .login(login_request("a@x.com", "wrong"), &client)
            .await;
        let unknown_email = fx
            .service
            .login(login_request("nobody@x.com", "pw123"), &client)
            .await;

        assert!(matches!(wrong_password, Err(AppError::InvalidCredentials)));
        assert!(matches!(unknown_email, Err(AppError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn test_corrupt_stored_hash_is_invalid_credentials() {
        let fx = fixture();
        fx.directory
            .create(NewUser {
                email: "a@x.com".to_string(),
                password_hash: "not-a-phc-string".to_string(),
            })
            .await
            .unwrap();

        let result = fx
            .service
            .login(login_request("a@x.com", "pw123"), &ClientInfo::default())
            .await;
        assert!(matches!(result, Err(AppError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn test_logins_create_independent_sessions() {
        let fx = fixture();
        let client = ClientInfo {
            ip_address: Some("203.0.113.5".to_string()),
            user_agent: Some("curl/8.0".to_string()),
        };
        fx.service
            .register(register_request("a@x.com", "pw123"), &client)
            .await
            .unwrap();

        let first = fx
            .service
            .login(login_request("a@x.com", "pw123"), &client)
            .await
            .unwrap();
        let second = fx
            .service
            .login(login_request("a@x.com", "pw123"), &client)
            .await
            .unwrap();

        assert_ne!(first.session.session_id, second.session.session_id);
        assert_eq!(first.session.ip_address, "203.0.113.5");
        assert_eq!(first.session.user_agent, "curl/8.0");

        fx.service.logout(&first.session, &client).await;
        assert!(fx.sessions.get(first.session.session_id).await.is_err());
        assert!(fx.sessions.get(second.session.session_id).await.is_ok());
    }

    #[tokio::test]
    async fn test_logout_is_idempotent() {
        let fx = fixture();
        let session = Session::new(UserId(1), "", "");

        fx.service.logout(&session, &ClientInfo::default()).await;
        fx.service.logout(&session, &ClientInfo::default()).await;
    }

    /// Directory that never answers within the deadline
    struct StalledDirectory;

    #[async_trait]
    impl UserDirectory for StalledDirectory {
        async fn create(&self, _: NewUser) -> Result<User, DirectoryError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Err(DirectoryError::NotFound)
        }

        async fn get_by_email(&self, _: &str) -> Result<User, DirectoryError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Err(DirectoryError::NotFound)
        }

        async fn get_by_id(&self, _: UserId) -> Result<User, DirectoryError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Err(DirectoryError::NotFound)
        }
    }

    #[tokio::test]
    async fn test_directory_timeout_is_internal() {
        let fx = fixture();
        let service = AuthService::new(
            Arc::new(StalledDirectory),
            fx.sessions.clone(),
            fx.tokens.clone(),
            test_hasher(),
            TokenConfig::default(),
            Duration::from_millis(50),
        )
        .unwrap();
        let client = ClientInfo::default();

        let login = service.login(login_request("a@x.com", "pw123"), &client).await;
        assert!(matches!(login, Err(AppError::Internal(_))));

        let register = service
            .register(register_request("a@x.com", "pw123"), &client)
            .await;
        assert!(matches!(register, Err(AppError::Internal(_))));
    }
}
