//! The central error-mapper: translates component errors into the
//! `{error, description?}` JSON body and HTTP status code every handler
//! returns on failure.

use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;

use authproxy_auth::AuthError;
use authproxy_gateway::GatewayError;

/// Errors surfaced by this crate's own handlers, above and beyond what
/// `AuthError`/`GatewayError` already cover (malformed request bodies,
/// missing session context).
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("bad_request: {message}")]
    BadRequest { message: String },

    #[error("unauthenticated: {message}")]
    Unauthenticated { message: String },

    #[error("not_found: {message}")]
    NotFound { message: String },

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, error, description): (StatusCode, String, Option<String>) = match &self {
            Self::BadRequest { message } => {
                (StatusCode::BAD_REQUEST, "bad_request".to_string(), Some(message.clone()))
            }
            Self::Unauthenticated { message } => {
                (StatusCode::UNAUTHORIZED, "unauthenticated".to_string(), Some(message.clone()))
            }
            Self::NotFound { message } => (StatusCode::NOT_FOUND, "not_found".to_string(), Some(message.clone())),
            Self::Auth(err) => (auth_status(err), err.oauth_error_code().to_string(), Some(err.to_string())),
            // RequestGuard rejections carry their full templated message as
            // the error value itself, per the literal S3 scenario — no
            // separate code/description split.
            Self::Gateway(err @ GatewayError::Forbidden(_)) => (StatusCode::FORBIDDEN, err.to_string(), None),
            Self::Gateway(err) => (gateway_status(err), gateway_code(err).to_string(), Some(err.to_string())),
        };

        tracing::warn!(status = status.as_u16(), error = %error, "request failed");

        (status, Json(ErrorBody { error, description })).into_response()
    }
}

fn auth_status(err: &AuthError) -> StatusCode {
    match err {
        AuthError::InvalidClientMetadata { .. }
        | AuthError::InvalidRedirectUri { .. }
        | AuthError::InvalidClient { .. }
        | AuthError::InvalidGrant { .. }
        | AuthError::InvalidScope { .. }
        | AuthError::NoUser { .. }
        | AuthError::NoClient { .. }
        | AuthError::NoPatient { .. }
        | AuthError::NoPatientForUser { .. }
        | AuthError::MalformedLifetime { .. }
        | AuthError::MalformedExpiration { .. }
        | AuthError::NoToken => StatusCode::BAD_REQUEST,
        AuthError::InvalidToken { .. } | AuthError::AuthenticationFailure => StatusCode::UNAUTHORIZED,
        AuthError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        AuthError::PasswordHash { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn gateway_status(err: &GatewayError) -> StatusCode {
    match err {
        GatewayError::Forbidden(_) => StatusCode::FORBIDDEN,
        GatewayError::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
        GatewayError::UpstreamTransport(_) => StatusCode::BAD_GATEWAY,
        GatewayError::MalformedConformance(_) => StatusCode::BAD_GATEWAY,
    }
}

fn gateway_code(err: &GatewayError) -> &'static str {
    match err {
        GatewayError::Forbidden(_) => "forbidden",
        GatewayError::UpstreamTimeout => "upstream_timeout",
        GatewayError::UpstreamTransport(_) => "upstream_transport_error",
        GatewayError::MalformedConformance(_) => "malformed_conformance",
    }
}
