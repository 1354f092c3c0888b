//! Bearer token authentication.
//!
//! Extracts `Authorization: Bearer <token>`, resolves it to an active [`User`] and injects the
//! user into request extensions for downstream handlers.

use crate::error::{ApiError, ApiResult};
use crate::AppState;
use api_shared::auth::bearer_token;
use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use hms_core::User;

pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> ApiResult<Response> {
    let token = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token)
        .ok_or(ApiError::Unauthorized)?
        .to_string();

    let user = state.users.authenticate(&token)?.ok_or_else(|| {
        tracing::debug!("rejected unknown or inactive API token");
        ApiError::Unauthorized
    })?;

    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

/// Rejects non-admin users with 403.
pub fn require_admin(user: &User) -> ApiResult<()> {
    if user.is_admin() {
        Ok(())
    } else {
        Err(ApiError::Forbidden(format!(
            "{} role cannot perform this action",
            user.role
        )))
    }
}
