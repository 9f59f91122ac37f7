//! OAuth-engine-specific configuration: lifetimes for grants, access
//! tokens, and approval windows.
//!
//! Nested inside the top-level `authproxy-server` configuration the same
//! way the teacher nests its own per-concern config structs.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifetime knobs for the grant/token state machine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OAuthConfig {
    /// How long an authorization code stays valid. Specified as 100s.
    #[serde(with = "humantime_serde")]
    pub grant_lifetime: Duration,

    /// Default access-token lifetime handed to `issue_token` when the
    /// caller does not specify `expires_in`.
    #[serde(with = "humantime_serde")]
    pub access_token_lifetime: Duration,

    /// Default approval window (refresh-token lifetime) for a freshly
    /// consented authorization.
    #[serde(with = "humantime_serde")]
    pub approval_window: Duration,

    /// How many times a token issuance retries after losing a
    /// compare-and-swap race before surfacing `ServiceUnavailable`.
    pub max_cas_retries: u32,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            grant_lifetime: Duration::from_secs(100),
            access_token_lifetime: Duration::from_secs(3600),
            approval_window: Duration::from_secs(365 * 24 * 3600),
            max_cas_retries: 3,
        }
    }
}

/// Errors from [`OAuthConfig::validate`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum OAuthConfigError {
    #[error("grant_lifetime must be greater than zero")]
    ZeroGrantLifetime,
    #[error("access_token_lifetime must be greater than zero")]
    ZeroAccessTokenLifetime,
    #[error("approval_window ({approval_window:?}) must be >= access_token_lifetime ({access_token_lifetime:?})")]
    ApprovalWindowShorterThanAccessToken {
        approval_window: Duration,
        access_token_lifetime: Duration,
    },
}

impl OAuthConfig {
    /// Validates the invariant `approval_expires >= expires` holds for the
    /// *default* lifetimes (per-call `expires_in` overrides are validated
    /// separately by the engine).
    pub fn validate(&self) -> Result<(), OAuthConfigError> {
        if self.grant_lifetime.is_zero() {
            return Err(OAuthConfigError::ZeroGrantLifetime);
        }
        if self.access_token_lifetime.is_zero() {
            return Err(OAuthConfigError::ZeroAccessTokenLifetime);
        }
        if self.approval_window < self.access_token_lifetime {
            return Err(OAuthConfigError::ApprovalWindowShorterThanAccessToken {
                approval_window: self.approval_window,
                access_token_lifetime: self.access_token_lifetime,
            });
        }
        Ok(())
    }
}
