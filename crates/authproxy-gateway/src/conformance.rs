//! Fetches the upstream capability statement and merges in the
//! SMART-on-FHIR OAuth discovery extension.

use std::collections::BTreeMap;

use serde_json::{Value, json};
use tracing::{debug, instrument};

use crate::error::GatewayError;

const OAUTH_URIS_EXTENSION: &str =
    "http://fhir-registry.smarthealthit.org/StructureDefinition/oauth-uris";
const SECURITY_SERVICE_SYSTEM: &str = "http://hl7.org/fhir/restful-security-service";
const SECURITY_SERVICE_TEXT: &str =
    "OAuth2 using SMART-on-FHIR profile (see http://docs.smarthealthit.org)";

/// Rewrites an upstream `CapabilityStatement` to advertise this proxy's
/// OAuth endpoints.
#[derive(Clone)]
pub struct ConformanceRewriter {
    client: reqwest::Client,
}

impl ConformanceRewriter {
    /// Builds a client with `timeout` applied to the metadata fetch.
    ///
    /// # Panics
    /// If the underlying TLS backend cannot be initialized.
    #[must_use]
    pub fn new(timeout: std::time::Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to build conformance HTTP client");
        Self { client }
    }

    /// Fetches `upstream_metadata_url` and returns the document with
    /// `rest[0].security.extension` and `rest[0].security.service` set from
    /// `extensions` (a map of discovery endpoint name to URL, e.g.
    /// `authorize`, `token`, `register`, `manage`).
    #[instrument(skip(self, extensions), fields(url = %upstream_metadata_url))]
    pub async fn conformance(
        &self,
        upstream_metadata_url: &str,
        extensions: &BTreeMap<String, String>,
    ) -> Result<Value, GatewayError> {
        let response = self
            .client
            .get(upstream_metadata_url)
            .header("Accept", "application/json+fhir")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GatewayError::UpstreamTimeout
                } else {
                    GatewayError::UpstreamTransport(e.to_string())
                }
            })?;

        let mut document: Value = response
            .json()
            .await
            .map_err(|e| GatewayError::MalformedConformance(e.to_string()))?;

        let rest_entry = document
            .get_mut("rest")
            .and_then(Value::as_array_mut)
            .and_then(|entries| entries.get_mut(0))
            .ok_or_else(|| {
                GatewayError::MalformedConformance("capability statement has no rest[0]".to_string())
            })?;

        if rest_entry.get("security").is_none() {
            rest_entry["security"] = json!({});
        }
        let security = &mut rest_entry["security"];

        let extension_entries: Vec<Value> = extensions
            .iter()
            .map(|(name, url)| json!({ "url": name, "valueUri": url }))
            .collect();

        security["extension"] = json!([{
            "url": OAUTH_URIS_EXTENSION,
            "extension": extension_entries,
        }]);
        security["service"] = json!([{
            "coding": [{ "system": SECURITY_SERVICE_SYSTEM, "code": "SMART-on-FHIR" }],
            "text": SECURITY_SERVICE_TEXT,
        }]);

        debug!("rewrote capability statement security block");
        Ok(document)
    }
}
