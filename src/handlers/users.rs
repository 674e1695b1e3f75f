use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::Extension;
use serde::Deserialize;
use tracing::warn;

use crate::error::ApiError;
use crate::middleware::{AuthSession, AUTH_HEADER};
use crate::models::user::{PublicUser, User};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// POST /users - register, responding with the public user and an `x-auth`
/// token header for immediate authentication
pub async fn user_register(
    State(state): State<AppState>,
    body: Result<Json<Credentials>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = body?;
    let (user, token) = User::register(&state.store, &body.email, &body.password).await?;
    with_auth_header(&user, &token)
}

/// POST /users/login - every failure surfaces as a generic 400, without
/// distinguishing unknown email from wrong password
pub async fn user_login(
    State(state): State<AppState>,
    body: Result<Json<Credentials>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = body?;
    let (user, token) = User::login(&state.store, &body.email, &body.password)
        .await
        .map_err(|err| {
            warn!("login rejected: {err}");
            ApiError::bad_request("invalid email or password")
        })?;
    with_auth_header(&user, &token)
}

/// GET /users/me - the authenticated user's public view
pub async fn user_me(Extension(session): Extension<AuthSession>) -> Json<PublicUser> {
    Json(session.user.public())
}

/// DELETE /users/me/token - revoke exactly the token used on this request
pub async fn user_logout(
    State(state): State<AppState>,
    Extension(session): Extension<AuthSession>,
) -> Result<StatusCode, ApiError> {
    let AuthSession { mut user, token } = session;
    user.remove_token(&state.store, &token).await?;
    Ok(StatusCode::OK)
}

fn with_auth_header(user: &User, token: &str) -> Result<Response, ApiError> {
    let value = HeaderValue::from_str(token)
        .map_err(|_| ApiError::bad_request("unable to process request"))?;
    let mut response = Json(user.public()).into_response();
    response
        .headers_mut()
        .insert(HeaderName::from_static(AUTH_HEADER), value);
    Ok(response)
}
