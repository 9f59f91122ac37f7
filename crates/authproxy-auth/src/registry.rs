//! Dynamic client registration (an RFC 7591 subset) and redirect-URI
//! validation.

use std::{collections::BTreeSet, sync::Arc};

use authproxy_core::generate_id;
use authproxy_storage::{Client, Store};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::AuthError;

/// The fixed set of security label categories every newly registered
/// client is seeded with.
const DEFAULT_SECURITY_LABELS: &[&str] = &[
    "patient",
    "medications",
    "allergies",
    "immunizations",
    "problems",
    "procedures",
    "vital-signs",
    "laboratory",
    "smoking",
];

/// The response body of a successful registration, matching the dynamic
/// client registration response shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientRegistration {
    pub client_id: String,
    pub client_secret: String,
    /// Always `0`: "never expires".
    pub client_secret_expires_at: u64,
    pub client_name: String,
    pub redirect_uris: Vec<String>,
    pub scope: String,
}

/// Registers new OAuth clients and resolves existing ones by id.
pub struct ClientRegistry {
    store: Arc<dyn Store>,
}

impl ClientRegistry {
    /// Builds a registry backed by `store`.
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Registers a new client.
    ///
    /// # Errors
    /// [`AuthError::InvalidClientMetadata`] if `redirect_uris` is empty;
    /// [`AuthError::InvalidRedirectUri`] if any entry lacks a scheme or
    /// carries a fragment; [`AuthError::ServiceUnavailable`] on a storage
    /// failure.
    pub async fn register(
        &self,
        redirect_uris: Vec<String>,
        scopes: BTreeSet<String>,
        client_name: Option<String>,
    ) -> Result<ClientRegistration, AuthError> {
        if redirect_uris.is_empty() {
            return Err(AuthError::InvalidClientMetadata {
                message: "redirect_uris must not be empty".to_string(),
            });
        }
        for uri in &redirect_uris {
            validate_redirect_uri(uri)?;
        }

        let client_id = generate_id();
        let client_secret = generate_id();
        let name = client_name.unwrap_or_else(|| client_id.clone());
        let security_labels: BTreeSet<String> = DEFAULT_SECURITY_LABELS
            .iter()
            .map(|s| (*s).to_string())
            .collect();

        let client = Client {
            client_id: client_id.clone(),
            client_secret: client_secret.clone(),
            name: name.clone(),
            redirect_uris: redirect_uris.clone(),
            default_scopes: scopes.clone(),
            security_labels,
        };
        self.store.create_client(client).await?;

        Ok(ClientRegistration {
            client_id,
            client_secret,
            client_secret_expires_at: 0,
            client_name: name,
            redirect_uris,
            scope: scopes.into_iter().collect::<Vec<_>>().join(" "),
        })
    }

    /// Resolves a client by id.
    ///
    /// # Errors
    /// [`AuthError::ServiceUnavailable`] on a storage failure.
    pub async fn lookup(&self, client_id: &str) -> Result<Option<Client>, AuthError> {
        Ok(self.store.find_client(client_id).await?)
    }
}

/// A redirect URI is acceptable iff it parses as an absolute URL (so it
/// carries a scheme) and has no fragment.
fn validate_redirect_uri(uri: &str) -> Result<(), AuthError> {
    let parsed = Url::parse(uri).map_err(|_| AuthError::InvalidRedirectUri {
        message: format!("A URI scheme is required: {uri}"),
    })?;
    if parsed.fragment().is_some() {
        return Err(AuthError::InvalidRedirectUri {
            message: format!("Redirect URIs must not contain a fragment: {uri}"),
        });
    }
    Ok(())
}
