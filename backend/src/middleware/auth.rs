//! Authentication middleware
//!
//! Session authentication and role-based access control. The access token
//! travels either in the `fleet_session` cookie set at login or in an
//! `Authorization: Bearer` header.

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::extract::CookieJar;
use uuid::Uuid;

use shared::{permission_key, Action, Resource};

use crate::error::{AppError, AppResult, ErrorDetail, ErrorResponse};
use crate::services::auth::decode_access_token;
use crate::AppState;

/// Name of the session cookie carrying the access token
pub const SESSION_COOKIE: &str = "fleet_session";

/// Authenticated user information extracted from the session token
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub role_id: Uuid,
    pub permissions: Vec<String>,
}

impl AuthUser {
    /// Check if user has a specific permission
    pub fn has_permission(&self, resource: Resource, action: Action) -> bool {
        let permission = permission_key(resource, action);
        self.permissions.contains(&permission)
    }

    /// Check if user has any of the specified permissions
    pub fn has_any_permission(&self, perms: &[(Resource, Action)]) -> bool {
        perms.iter().any(|(r, a)| self.has_permission(*r, *a))
    }

    /// Permission guard for handlers
    pub fn require(&self, resource: Resource, action: Action) -> AppResult<()> {
        if self.has_permission(resource, action) {
            Ok(())
        } else {
            tracing::warn!(
                user_id = %self.user_id,
                permission = %permission_key(resource, action),
                "Permission denied"
            );
            Err(AppError::InsufficientPermissions)
        }
    }
}

/// Pull the access token from the Authorization header, falling back to the
/// session cookie
fn extract_token(request: &Request, jar: &CookieJar) -> Option<String> {
    let bearer = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());

    bearer.or_else(|| jar.get(SESSION_COOKIE).map(|c| c.value().to_string()))
}

/// Authentication middleware that validates the session token
pub async fn auth_middleware(
    State(state): State<AppState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(token) = extract_token(&request, &jar) else {
        return unauthorized_response("Missing session or Authorization header");
    };

    let claims = match decode_access_token(&token, &state.config.session.secret) {
        Ok(claims) => claims,
        Err(err) => return err.into_response(),
    };

    let user_id = match Uuid::parse_str(&claims.sub) {
        Ok(id) => id,
        Err(_) => return unauthorized_response("Invalid user ID in token"),
    };

    let role_id = match Uuid::parse_str(&claims.role_id) {
        Ok(id) => id,
        Err(_) => return unauthorized_response("Invalid role ID in token"),
    };

    request.extensions_mut().insert(AuthUser {
        user_id,
        role_id,
        permissions: claims.permissions,
    });

    next.run(request).await
}

/// Create unauthorized response
fn unauthorized_response(message: &str) -> Response {
    let error = ErrorResponse {
        error: ErrorDetail::new("UNAUTHORIZED", message),
    };

    (StatusCode::UNAUTHORIZED, Json(error)).into_response()
}

/// Extractor for authenticated user
/// Use this in handlers to get the current user
#[derive(Clone, Debug)]
pub struct CurrentUser(pub AuthUser);

#[axum::async_trait]
impl<S> axum::extract::FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<ErrorResponse>);

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .map(CurrentUser)
            .ok_or_else(|| {
                let error = ErrorResponse {
                    error: ErrorDetail::new("UNAUTHORIZED", "Authentication required"),
                };
                (StatusCode::UNAUTHORIZED, Json(error))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(perms: &[&str]) -> AuthUser {
        AuthUser {
            user_id: Uuid::new_v4(),
            role_id: Uuid::new_v4(),
            permissions: perms.iter().map(|p| p.to_string()).collect(),
        }
    }

    #[test]
    fn test_has_permission() {
        let u = user(&["vehicle:view", "driver:edit"]);
        assert!(u.has_permission(Resource::Vehicle, Action::View));
        assert!(!u.has_permission(Resource::Vehicle, Action::Edit));
        assert!(u.has_any_permission(&[
            (Resource::Agreement, Action::View),
            (Resource::Driver, Action::Edit),
        ]));
    }

    #[test]
    fn test_require_rejects_missing_permission() {
        let u = user(&["vehicle:view"]);
        assert!(u.require(Resource::Vehicle, Action::View).is_ok());
        assert!(matches!(
            u.require(Resource::User, Action::Delete),
            Err(AppError::InsufficientPermissions)
        ));
    }
}
