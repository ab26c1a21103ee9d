//! Authentication API handlers
//!
//! Registration and login are public. `me` and `logout` sit behind
//! [`auth_middleware`](crate::auth::auth_middleware) and read the resolved
//! [`AuthContext`] from the request extensions.
//!
//! Author: hephaex@gmail.com

use crate::audit::ClientInfo;
use crate::auth::cookie::{create_logout_cookie, create_session_cookie};
use crate::auth::{AuthContext, LoginRequest, MessageResponse, RegisterRequest, UserInfo};
use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use axum_extra::extract::cookie::CookieJar;
use std::net::SocketAddr;
use std::sync::Arc;

fn client_info(headers: &HeaderMap, peer: Option<ConnectInfo<SocketAddr>>) -> ClientInfo {
    ClientInfo::from_request(headers, peer.map(|ConnectInfo(addr)| addr))
}

/// Register a new user account
///
/// # Responses
///
/// * `201 Created` - User registered, public profile returned
/// * `400 Bad Request` - Invalid input
/// * `409 Conflict` - Email already registered
#[utoipa::path(
    post,
    path = "/api/v1/users/register",
    tag = "auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered successfully", body = UserInfo),
        (status = 400, description = "Invalid input", body = crate::error::ApiError),
        (status = 409, description = "Email already registered", body = crate::error::ApiError),
        (status = 500, description = "Internal server error", body = crate::error::ApiError),
    )
)]
pub async fn register_handler(
    State(state): State<Arc<AppState>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(request) = payload?;
    let client = client_info(&headers, peer);

    let user = state.auth.register(request, &client).await?;

    Ok((StatusCode::CREATED, Json(UserInfo::from(&user))))
}

/// Login with email and password
///
/// On success the bearer token is set as an HttpOnly session cookie. It is
/// never returned in the body.
#[utoipa::path(
    post,
    path = "/api/v1/users/auth",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful, session cookie set", body = MessageResponse),
        (status = 400, description = "Invalid input", body = crate::error::ApiError),
        (status = 401, description = "Invalid email or password", body = crate::error::ApiError),
        (status = 500, description = "Internal server error", body = crate::error::ApiError),
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    jar: CookieJar,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(request) = payload?;
    let client = client_info(&headers, peer);

    let outcome = state.auth.login(request, &client).await?;
    let cookie = create_session_cookie(
        state.auth.token_config(),
        outcome.token,
        state.secure_cookies(),
    );

    Ok((jar.add(cookie), Json(MessageResponse::new("logged in"))))
}

/// Get the current user
#[utoipa::path(
    get,
    path = "/api/v1/auth/me",
    tag = "auth",
    responses(
        (status = 200, description = "Current user profile", body = UserInfo),
        (status = 401, description = "Unauthenticated", body = crate::error::ApiError),
        (status = 500, description = "Internal server error", body = crate::error::ApiError),
    ),
    security(
        ("session_cookie" = [])
    )
)]
pub async fn me_handler(Extension(context): Extension<AuthContext>) -> Json<UserInfo> {
    Json(UserInfo::from(&context.user))
}

/// Logout the current session
///
/// Deletes the server-side session and clears the cookie. Store failures
/// are logged, never returned.
#[utoipa::path(
    post,
    path = "/api/v1/auth/logout",
    tag = "auth",
    responses(
        (status = 200, description = "Logout successful", body = MessageResponse),
        (status = 401, description = "Unauthenticated", body = crate::error::ApiError),
    ),
    security(
        ("session_cookie" = [])
    )
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    Extension(context): Extension<AuthContext>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    jar: CookieJar,
) -> impl IntoResponse {
    let client = client_info(&headers, peer);
    state.auth.logout(&context.session, &client).await;

    let cookie = create_logout_cookie(state.auth.token_config(), state.secure_cookies());
    (jar.add(cookie), Json(MessageResponse::new("logged out")))
}
