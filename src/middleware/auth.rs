use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::warn;

use crate::error::ApiError;
use crate::models::user::User;
use crate::AppState;

/// Header carrying the bearer token.
pub const AUTH_HEADER: &str = "x-auth";

/// Identity attached to the request once the presented token resolves to a
/// user. Carries the raw token so logout can revoke exactly the credential
/// that was used.
#[derive(Clone)]
pub struct AuthSession {
    pub user: User,
    pub token: String,
}

/// Token authentication middleware for protected routes.
///
/// Reads the `x-auth` header, resolves it through `User::find_by_token`, and
/// injects an `AuthSession` into the request extensions. Any failure is a 401
/// and the protected handler never runs.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = request
        .headers()
        .get(AUTH_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
        .ok_or_else(|| ApiError::unauthorized("missing x-auth header"))?;

    let user = User::find_by_token(&state.store, &token).await.map_err(|err| {
        warn!("auth token rejected: {err}");
        ApiError::unauthorized("invalid auth token")
    })?;

    request.extensions_mut().insert(AuthSession { user, token });
    Ok(next.run(request).await)
}
