//! Value types for the five persisted record kinds.
//!
//! Rows are represented by value, carrying foreign keys as plain ids; the
//! small cycle between `User` and `Patient` is broken by keeping patients as
//! a derived query (`Store::list_patients_for_user`) rather than an embedded
//! list on `User`.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// A registered OAuth 2.0 client application.
///
/// Created once by `ClientRegistry::register` and never mutated afterwards;
/// deletion is an admin-only operation outside this crate's surface.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Client {
    pub client_id: String,
    pub client_secret: String,
    pub name: String,
    /// Ordered, non-empty. The first entry is the default redirect target.
    pub redirect_uris: Vec<String>,
    pub default_scopes: BTreeSet<String>,
    pub security_labels: BTreeSet<String>,
}

impl Client {
    /// Always `"confidential"`; no other client type is ever issued.
    #[must_use]
    pub fn client_type(&self) -> &'static str {
        "confidential"
    }

    /// The redirect URI used when the caller does not specify one.
    #[must_use]
    pub fn default_redirect_uri(&self) -> Option<&str> {
        self.redirect_uris.first().map(String::as_str)
    }
}

/// An account holder. Authentication is performed per-request via
/// `PasswordHasher::verify`; there is no persisted "logged in" flag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub username: String,
    /// PHC-encoded PBKDF2-SHA512 hash, never the plaintext password.
    pub password_hash: String,
    pub name: String,
}

/// A FHIR patient resource a user is permitted to act as or on behalf of.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Patient {
    pub id: i64,
    /// The FHIR resource id, e.g. `"smart-1"`.
    pub patient_id: String,
    pub name: String,
    /// Whether this patient record is the account owner, as opposed to a
    /// delegated subject (a parent managing a child's record, say).
    pub is_user: bool,
    pub user_id: i64,
}

/// A single-use authorization code.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Grant {
    pub id: Uuid,
    pub client_id: String,
    pub user_id: i64,
    pub code: String,
    pub redirect_uri: String,
    pub scopes: BTreeSet<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub expires: OffsetDateTime,
}

impl Grant {
    /// A grant is usable iff it has not yet expired.
    #[must_use]
    pub fn is_valid(&self, now: OffsetDateTime) -> bool {
        self.expires > now
    }
}

/// A bearer access credential and its refresh partner.
///
/// A `Token` passes through three shapes over its lifetime: *preauthorized*
/// (created by `create_authorization`, `access_token`/`refresh_token` are
/// `None`), *issued* (both populated by `issue_token`/`refresh`), and
/// *expired* (its `approval_expires` has passed; the record is not deleted
/// automatically, but `refresh` will reject it as a basis).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Token {
    pub id: Uuid,
    pub client_id: String,
    pub user_id: i64,
    pub patient_id: Option<String>,
    pub token_type: String,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub scopes: BTreeSet<String>,
    pub security_labels: BTreeSet<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub expires: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub approval_expires: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Token {
    /// Always `"bearer"`.
    #[must_use]
    pub fn token_type() -> &'static str {
        "bearer"
    }

    /// Whether the long-lived approval window has passed. An expired
    /// approval window still leaves the access token valid until
    /// `expires`, but blocks further refreshes.
    #[must_use]
    pub fn approval_expired(&self, now: OffsetDateTime) -> bool {
        now >= self.approval_expires
    }

    /// The stable JSON shape returned by the introspection and `/api/me`
    /// endpoints.
    #[must_use]
    pub fn interest(&self, username: &str) -> TokenInterest {
        TokenInterest {
            token_type: self.token_type.clone(),
            access_token: self.access_token.clone(),
            refresh_token: self.refresh_token.clone(),
            approval_expires: self.approval_expires,
            security_labels: self.security_labels.iter().cloned().collect(),
            access_expires: self.expires,
            scope: self
                .scopes
                .iter()
                .cloned()
                .collect::<Vec<_>>()
                .join(" "),
            client_id: self.client_id.clone(),
            username: username.to_owned(),
        }
    }
}

/// Stable JSON view of a [`Token`] for inspection endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TokenInterest {
    pub token_type: String,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub approval_expires: OffsetDateTime,
    pub security_labels: Vec<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub access_expires: Option<OffsetDateTime>,
    pub scope: String,
    pub client_id: String,
    pub username: String,
}
