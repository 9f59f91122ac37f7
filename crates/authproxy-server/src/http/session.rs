//! The authenticated-user boundary.
//!
//! Session cookies, login forms, and CSRF protection are out of scope for
//! this crate (they are external collaborators per the system's purpose):
//! this service assumes it sits behind a session layer that has already
//! authenticated the caller and forwards the result as an `X-Auth-User`
//! header carrying the username. [`AuthenticatedUser`] is the one seam
//! where that external contract meets this crate.
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use authproxy_auth::AuthError;
use authproxy_storage::User;

use crate::error::ApiError;
use crate::state::AppState;

const AUTH_USER_HEADER: &str = "x-auth-user";
const ADMIN_KEY_HEADER: &str = "x-admin-key";

/// The account the external session layer has already authenticated.
pub struct AuthenticatedUser(pub User);

impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let username = parts
            .headers
            .get(AUTH_USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::Unauthenticated {
                message: format!("missing {AUTH_USER_HEADER} header"),
            })?;

        let user = state
            .store
            .find_user_by_username(username)
            .await
            .map_err(AuthError::from)?
            .ok_or_else(|| ApiError::Unauthenticated {
                message: format!("no such user: {username}"),
            })?;

        Ok(Self(user))
    }
}

/// Proves the admin debug endpoints are being called with the shared
/// `secret_key`, via an `X-Admin-Key` header. The source gates these
/// endpoints implicitly (no public route wiring); this is the minimal
/// stand-in for that operational boundary.
pub struct AdminKey;

impl FromRequestParts<AppState> for AdminKey {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let presented = parts
            .headers
            .get(ADMIN_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::Unauthenticated {
                message: format!("missing {ADMIN_KEY_HEADER} header"),
            })?;

        if presented != state.config.secret_key {
            return Err(ApiError::Unauthenticated {
                message: "invalid admin key".to_string(),
            });
        }
        Ok(Self)
    }
}

/// A bearer access token from the `Authorization` header.
pub struct BearerToken(pub String);

impl<S> FromRequestParts<S> for BearerToken
where
    S: Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        bearer_from_parts(parts).ok_or_else(|| ApiError::Unauthenticated {
            message: "missing bearer token".to_string(),
        })
    }
}

fn bearer_from_parts(parts: &Parts) -> Option<BearerToken> {
    let header = parts.headers.get(axum::http::header::AUTHORIZATION)?.to_str().ok()?;
    header
        .strip_prefix("Bearer ")
        .map(|token| BearerToken(token.to_string()))
}
