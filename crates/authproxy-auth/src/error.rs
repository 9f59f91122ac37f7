//! Typed error taxonomy for the authorization engine.
//!
//! Each variant maps deterministically to an HTTP status and an OAuth-style
//! `{error, description}` body at the boundary (see
//! `authproxy-server`'s error mapper); nothing here is stringly-typed.

use authproxy_storage::StorageError;
use thiserror::Error;

/// Errors raised by [`crate::registry::ClientRegistry`], [`crate::engine::OAuthEngine`],
/// and [`crate::password::PasswordHasher`].
#[derive(Debug, Error)]
pub enum AuthError {
    /// Registration metadata failed validation, e.g. an empty `redirect_uris`.
    #[error("invalid_client_metadata: {message}")]
    InvalidClientMetadata { message: String },

    /// A redirect URI has no scheme, or carries a fragment.
    #[error("invalid_redirect_uri: {message}")]
    InvalidRedirectUri { message: String },

    /// No client exists for the given `client_id`.
    #[error("invalid_client: unknown client {client_id}")]
    InvalidClient { client_id: String },

    /// The authorization code or refresh token does not resolve to a live
    /// grant/token.
    #[error("invalid_grant: {message}")]
    InvalidGrant { message: String },

    /// The requested scope is not among the client's `default_scopes`.
    #[error("invalid_scope: {scope}")]
    InvalidScope { scope: String },

    /// Debug token creation referenced a username that does not exist.
    #[error("no_user: {username}")]
    NoUser { username: String },

    /// Debug token creation referenced a client id that does not exist.
    #[error("no_client: {client_id}")]
    NoClient { client_id: String },

    /// Debug token creation referenced a FHIR patient id that does not
    /// exist anywhere in the store.
    #[error("no_patient: {patient_id}")]
    NoPatient { patient_id: String },

    /// The resolved patient exists but is not owned by the given user.
    #[error("no_patient_for_user: patient {patient_id} not owned by user {user_id}")]
    NoPatientForUser { patient_id: String, user_id: i64 },

    /// `access_lifetime` was not a non-negative integer.
    #[error("malformed_lifetime: {value}")]
    MalformedLifetime { value: String },

    /// `approval_expires` failed to parse as a timestamp.
    #[error("malformed_expiration: {value}")]
    MalformedExpiration { value: String },

    /// Introspection found neither an access nor a refresh token matching
    /// the lookup value.
    #[error("no_token")]
    NoToken,

    /// A bearer token presented to the proxy does not resolve to a live,
    /// unexpired access token.
    #[error("invalid_token: {message}")]
    InvalidToken { message: String },

    /// Username/password did not authenticate.
    #[error("authentication failure")]
    AuthenticationFailure,

    /// A storage write lost its compare-and-swap race past the retry
    /// budget.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(#[from] StorageError),

    /// PBKDF2 hash generation failed (salt generation, encoding).
    #[error("password hashing failed: {message}")]
    PasswordHash { message: String },
}

impl AuthError {
    /// The `error` token in the OAuth-shaped JSON body, where one applies.
    #[must_use]
    pub fn oauth_error_code(&self) -> &'static str {
        match self {
            Self::InvalidClientMetadata { .. } => "invalid_client_metadata",
            Self::InvalidRedirectUri { .. } => "invalid_redirect_uri",
            Self::InvalidClient { .. } => "invalid_client",
            Self::InvalidGrant { .. } => "invalid_grant",
            Self::InvalidScope { .. } => "invalid_scope",
            Self::NoUser { .. } => "no_user",
            Self::NoClient { .. } => "no_client",
            Self::NoPatient { .. } => "no_patient",
            Self::NoPatientForUser { .. } => "no_patient_for_user",
            Self::MalformedLifetime { .. } => "malformed_lifetime",
            Self::MalformedExpiration { .. } => "malformed_expiration",
            Self::NoToken => "no_token",
            Self::InvalidToken { .. } => "invalid_token",
            Self::AuthenticationFailure => "authentication_failure",
            Self::ServiceUnavailable(_) => "temporarily_unavailable",
            Self::PasswordHash { .. } => "server_error",
        }
    }

    /// Whether this error is a client-input problem (HTTP 400/403 family)
    /// as opposed to a server-side condition.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::ServiceUnavailable(_) | Self::PasswordHash { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oauth_error_code_matches_each_variant() {
        assert_eq!(
            AuthError::InvalidClientMetadata {
                message: "x".into()
            }
            .oauth_error_code(),
            "invalid_client_metadata"
        );
        assert_eq!(AuthError::NoToken.oauth_error_code(), "no_token");
        assert_eq!(
            AuthError::AuthenticationFailure.oauth_error_code(),
            "authentication_failure"
        );
    }

    #[test]
    fn service_unavailable_is_not_a_client_error() {
        let err = AuthError::ServiceUnavailable(StorageError::Backend("boom".into()));
        assert!(!err.is_client_error());
    }

    #[test]
    fn no_patient_for_user_is_a_client_error() {
        let err = AuthError::NoPatientForUser {
            patient_id: "smart-1".into(),
            user_id: 2,
        };
        assert!(err.is_client_error());
    }
}
