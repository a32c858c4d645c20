//! Authentication handlers

use axum::{extract::State, http::StatusCode, Json};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;

use crate::error::AppError;
use crate::middleware::{ClientInfo, CurrentUser, SESSION_COOKIE};
use crate::services::auth::{AuthTokens, ChangePasswordInput, Profile};
use crate::services::{Actor, AuthService};
use crate::AppState;

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Session cookie holding the access token
fn session_cookie(token: String, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .build()
}

/// Login endpoint handler
pub async fn login(
    State(state): State<AppState>,
    client: ClientInfo,
    jar: CookieJar,
    Json(body): Json<LoginRequest>,
) -> Result<(CookieJar, Json<AuthTokens>), AppError> {
    if body.email.trim().is_empty() || body.password.is_empty() {
        return Err(AppError::validation("email", "Email and password are required"));
    }

    let auth_service = AuthService::new(state.db.clone(), &state.config);
    let tokens = auth_service
        .login(&body.email, &body.password, &Actor::anonymous(client.ip))
        .await?;

    let jar = jar.add(session_cookie(
        tokens.access_token.clone(),
        state.config.session.cookie_secure,
    ));
    Ok((jar, Json(tokens)))
}

/// Refresh token endpoint handler
pub async fn refresh(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(body): Json<RefreshRequest>,
) -> Result<(CookieJar, Json<AuthTokens>), AppError> {
    let auth_service = AuthService::new(state.db.clone(), &state.config);
    let tokens = auth_service.refresh_token(&body.refresh_token).await?;

    let jar = jar.add(session_cookie(
        tokens.access_token.clone(),
        state.config.session.cookie_secure,
    ));
    Ok((jar, Json(tokens)))
}

/// Revoke the caller's refresh tokens and clear the session cookie
pub async fn logout(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    jar: CookieJar,
) -> Result<(CookieJar, StatusCode), AppError> {
    let auth_service = AuthService::new(state.db.clone(), &state.config);
    auth_service.logout(user.user_id).await?;

    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
    Ok((jar, StatusCode::NO_CONTENT))
}

/// Current user with role and permissions
pub async fn me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Profile>, AppError> {
    let auth_service = AuthService::new(state.db.clone(), &state.config);
    let profile = auth_service.me(user.user_id).await?;
    Ok(Json(profile))
}

/// Change the caller's own password
pub async fn change_password(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    client: ClientInfo,
    Json(input): Json<ChangePasswordInput>,
) -> Result<StatusCode, AppError> {
    let auth_service = AuthService::new(state.db.clone(), &state.config);
    auth_service
        .change_password(&Actor::user(user.user_id, client.ip), user.user_id, input)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_cookie_flags() {
        let cookie = session_cookie("token".to_string(), true);
        assert_eq!(cookie.name(), SESSION_COOKIE);
        assert_eq!(cookie.value(), "token");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.path(), Some("/"));
    }
}
