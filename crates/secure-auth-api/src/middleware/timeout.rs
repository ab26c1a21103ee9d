//! Whole-request deadline
//!
//! A request that outlives `server.request_timeout_secs` is dropped, which
//! cancels its in-flight store calls, and answered as an internal error.

use crate::{error::AppError, state::AppState};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use std::time::Duration;

pub async fn request_timeout_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let limit = Duration::from_secs(state.config.server.request_timeout_secs);
    let method = request.method().clone();
    let path = request.uri().path().to_owned();

    tokio::time::timeout(limit, next.run(request))
        .await
        .map_err(|_| AppError::Internal(format!("{method} {path} exceeded {limit:?}")))
}
