//! Request authentication pipeline
//!
//! One strictly sequential, fail-closed pass over an incoming request:
//!
//! 1. Read the bearer token from the session cookie
//! 2. Verify signature, issuer, audience and validity window
//! 3. Parse the subject and session id claims
//! 4. Load the session from the session store
//! 5. Require the session owner to equal the token subject
//! 6. Load the user from the user directory
//!
//! Any failure short-circuits. Steps 1, 2 and 4 to 6 end in
//! `Unauthenticated`; step 3 and store faults end in `InternalError`.
//!
//! Author: hephaex@gmail.com

use super::bounded;
use super::jwt::{TokenCodec, TokenError};
use super::models::AuthContext;
use super::session::{SessionError, SessionStore};
use crate::audit::{audit_log, AuditEvent, ClientInfo};
use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use secure_auth_core::{DirectoryError, UserDirectory};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Reason a request failed authentication
///
/// Server-side only. The boundary collapses every variant into either a
/// generic 401 or a generic 500.
#[derive(Debug, Error)]
pub enum AuthFailure {
    #[error("missing session cookie")]
    MissingToken,

    #[error("token rejected: {0}")]
    Token(#[from] TokenError),

    #[error("inconsistent claims: {0}")]
    InconsistentClaims(String),

    #[error("session not found")]
    SessionNotFound,

    #[error("session owner does not match token subject")]
    SubjectMismatch,

    #[error("user not found")]
    UserNotFound,

    #[error("store failure: {0}")]
    Store(String),
}

impl AuthFailure {
    /// Whether the failure is a server-side fault rather than a bad credential
    pub fn is_internal(&self) -> bool {
        matches!(self, AuthFailure::InconsistentClaims(_) | AuthFailure::Store(_))
    }
}

impl From<AuthFailure> for AppError {
    fn from(failure: AuthFailure) -> Self {
        if failure.is_internal() {
            AppError::Internal(failure.to_string())
        } else {
            AppError::Unauthenticated
        }
    }
}

/// Composes token verification, session lookup and user lookup
#[derive(Clone)]
pub struct AuthPipeline {
    tokens: Arc<dyn TokenCodec>,
    sessions: Arc<dyn SessionStore>,
    directory: Arc<dyn UserDirectory>,
    directory_timeout: Duration,
}

impl AuthPipeline {
    pub fn new(
        tokens: Arc<dyn TokenCodec>,
        sessions: Arc<dyn SessionStore>,
        directory: Arc<dyn UserDirectory>,
        directory_timeout: Duration,
    ) -> Self {
        Self {
            tokens,
            sessions,
            directory,
            directory_timeout,
        }
    }

    /// Resolve a token into the authenticated user and session
    pub async fn authenticate(&self, token: Option<&str>) -> Result<AuthContext, AuthFailure> {
        let token = token
            .filter(|t| !t.is_empty())
            .ok_or(AuthFailure::MissingToken)?;

        let claims = self.tokens.verify(token)?;

        // Claims were signed by this service, so a parse failure is a fault
        let user_id = claims.user_id().map_err(|_| {
            AuthFailure::InconsistentClaims(format!("subject {:?} is not a user id", claims.sub))
        })?;
        let session_id = claims.session_id().map_err(|_| {
            AuthFailure::InconsistentClaims(format!("sid {:?} is not a session id", claims.sid))
        })?;

        let session = match self.sessions.get(session_id).await {
            Ok(session) => session,
            Err(SessionError::NotFound) => return Err(AuthFailure::SessionNotFound),
            Err(e) => return Err(AuthFailure::Store(e.to_string())),
        };

        if session.user_id != user_id {
            return Err(AuthFailure::SubjectMismatch);
        }

        let lookup = bounded(
            self.directory_timeout,
            self.directory.get_by_id(user_id),
            || DirectoryError::Timeout(self.directory_timeout),
        )
        .await;

        let user = match lookup {
            Ok(user) => user,
            Err(DirectoryError::NotFound) => return Err(AuthFailure::UserNotFound),
            Err(e) => return Err(AuthFailure::Store(e.to_string())),
        };

        Ok(AuthContext { user, session })
    }
}

/// Middleware guarding protected routes
///
/// On success the resolved [`AuthContext`] is inserted into the request
/// extensions.
///
/// ```ignore
/// let protected = Router::new()
///     .route("/auth/me", get(me_handler))
///     .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware));
/// ```
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = jar
        .get(&state.config.token.cookie_name)
        .map(|cookie| cookie.value().to_string());

    match state.pipeline.authenticate(token.as_deref()).await {
        Ok(context) => {
            tracing::debug!(
                user_id = %context.user.id,
                session_id = %context.session.session_id,
                "Request authenticated"
            );
            request.extensions_mut().insert(context);
            Ok(next.run(request).await)
        }
        Err(failure) => {
            let peer = request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| *addr);
            let client = ClientInfo::from_request(request.headers(), peer);

            let event = if failure.is_internal() {
                AuditEvent::AuthenticationFault {
                    reason: failure.to_string(),
                    ip_address: client.ip_address,
                    user_agent: client.user_agent,
                }
            } else {
                AuditEvent::AuthenticationRejected {
                    reason: failure.to_string(),
                    ip_address: client.ip_address,
                    user_agent: client.user_agent,
                }
            };
            audit_log(&event);

            Err(failure.into())
        }
    }
}
