//! API route definitions

use crate::auth::middleware::auth_middleware;
use crate::auth::{LoginRequest, MessageResponse, RegisterRequest, UserInfo};
use crate::error::ApiError;
use crate::handlers::{auth, health};
use crate::state::AppState;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};
use utoipa::{Modify, OpenApi};

/// Create API v1 routes
pub fn api_routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    // Public routes
    let public_routes = Router::new()
        .route("/health", get(health::health_check))
        .route("/users/register", post(auth::register_handler))
        .route("/users/auth", post(auth::login_handler));

    // Protected routes (session cookie required)
    let protected_routes = Router::new()
        .route("/auth/me", get(auth::me_handler))
        .route("/auth/logout", post(auth::logout_handler))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware));

    Router::new().merge(public_routes).merge(protected_routes)
}

/// OpenAPI document served at `/api-docs/openapi.json`
#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        auth::register_handler,
        auth::login_handler,
        auth::me_handler,
        auth::logout_handler,
    ),
    components(schemas(
        RegisterRequest,
        LoginRequest,
        UserInfo,
        MessageResponse,
        ApiError,
        health::HealthResponse,
    )),
    modifiers(&SessionCookieScheme),
    tags(
        (name = "auth", description = "Registration, login and session management"),
        (name = "health", description = "Liveness"),
    )
)]
pub struct ApiDoc;

struct SessionCookieScheme;

impl Modify for SessionCookieScheme {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "session_cookie",
                SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::new("session_token"))),
            );
        }
    }
}
