//! Environment-driven top-level configuration.
//!
//! Mirrors the `authproxy-auth::OAuthConfig` pattern one level up: a plain
//! `serde`-deserializable struct with defaults, loaded from the process
//! environment (optionally preloaded from a `.env` file) and validated once
//! before the server binds.

use std::{net::SocketAddr, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use authproxy_auth::OAuthConfig;

/// The full environment surface this service reads at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Upstream FHIR base URL the proxy forwards to.
    pub api_server: String,
    /// Display name for the upstream, surfaced in discovery responses.
    pub api_server_name: String,
    /// Canonical external base URL for browser-facing redirects.
    pub base_url: Option<String>,
    /// Whether `/api/open-fhir/*` is exposed. Defaults to `false`: the
    /// unsecured proxy bypasses both RequestGuard and SecurityTagger, so it
    /// is opt-in.
    pub enable_unsecure_fhir: bool,
    /// Shared secret. Doubles as the bearer credential for the admin-only
    /// debug endpoints (`/oauth/debug/*`), since no separate admin
    /// authentication mechanism is in scope.
    pub secret_key: String,
    /// Connection string for the persistence backend.
    pub database_uri: String,
    /// Default for CSRF protection on state-changing requests. Enforced by
    /// the external session/CSRF middleware this service composes behind,
    /// not by this crate; carried here only so that middleware can be
    /// configured from the same environment surface.
    pub csrf_check_default: bool,

    /// Address the HTTP server binds to.
    pub bind_addr: SocketAddr,
    /// Deadline applied to every upstream FHIR request.
    #[serde(with = "humantime_serde")]
    pub upstream_timeout: Duration,

    pub oauth: OAuthConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_server: String::new(),
            api_server_name: "upstream-fhir-server".to_string(),
            base_url: None,
            enable_unsecure_fhir: false,
            secret_key: String::new(),
            database_uri: "memory://".to_string(),
            csrf_check_default: true,
            bind_addr: ([0, 0, 0, 0], 8080).into(),
            upstream_timeout: Duration::from_secs(30),
            oauth: OAuthConfig::default(),
        }
    }
}

/// Errors from [`Config::validate`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("API_SERVER must not be empty")]
    MissingApiServer,
    #[error("BASE_URL does not parse as an absolute URL: {0}")]
    InvalidBaseUrl(String),
    #[error("SECRET_KEY must be at least {min} characters")]
    SecretKeyTooShort { min: usize },
}

const MIN_SECRET_KEY_LEN: usize = 16;

impl Config {
    /// Builds a [`Config`] from process environment variables, preloading a
    /// `.env` file first if one is present. Unset variables fall back to
    /// [`Default::default`]'s values.
    #[must_use]
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        let mut config = Self::default();
        if let Ok(v) = std::env::var("API_SERVER") {
            config.api_server = v;
        }
        if let Ok(v) = std::env::var("API_SERVER_NAME") {
            config.api_server_name = v;
        }
        if let Ok(v) = std::env::var("BASE_URL") {
            config.base_url = Some(v);
        }
        if let Ok(v) = std::env::var("ENABLE_UNSECURE_FHIR") {
            config.enable_unsecure_fhir = parse_bool(&v, config.enable_unsecure_fhir);
        }
        if let Ok(v) = std::env::var("SECRET_KEY") {
            config.secret_key = v;
        }
        if let Ok(v) = std::env::var("SQLALCHEMY_DATABASE_URI").or_else(|_| std::env::var("DATABASE_URI")) {
            config.database_uri = v;
        }
        if let Ok(v) = std::env::var("WTF_CSRF_CHECK_DEFAULT") {
            config.csrf_check_default = parse_bool(&v, config.csrf_check_default);
        }
        if let Ok(v) = std::env::var("BIND_ADDR") {
            if let Ok(addr) = v.parse() {
                config.bind_addr = addr;
            }
        }
        if let Ok(v) = std::env::var("UPSTREAM_TIMEOUT") {
            if let Ok(d) = humantime::parse_duration(&v) {
                config.upstream_timeout = d;
            }
        }
        config
    }

    /// Validates the ambient (non-OAuth) fields; [`OAuthConfig::validate`]
    /// covers `self.oauth` separately since it has its own error type.
    ///
    /// # Errors
    /// See [`ConfigError`] variants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_server.trim().is_empty() {
            return Err(ConfigError::MissingApiServer);
        }
        if let Some(base_url) = &self.base_url {
            Url::parse(base_url).map_err(|_| ConfigError::InvalidBaseUrl(base_url.clone()))?;
        }
        if self.secret_key.len() < MIN_SECRET_KEY_LEN {
            return Err(ConfigError::SecretKeyTooShort {
                min: MIN_SECRET_KEY_LEN,
            });
        }
        Ok(())
    }
}

fn parse_bool(raw: &str, default: bool) -> bool {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}
