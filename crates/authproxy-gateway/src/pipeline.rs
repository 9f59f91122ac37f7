//! Forwards an already-tagged and already-guarded request to the upstream
//! FHIR server.

use tracing::{debug, instrument};

use crate::error::GatewayError;

const RESPONSE_HEADER_ALLOW_LIST: &[&str] = &["Content-Type", "Access-Control-Allow-Origin"];

/// An outbound request ready to be sent upstream. Method, URL (including
/// query string), headers, and body have already been through
/// [`crate::guard::RequestGuard`] and [`crate::tagger::SecurityTagger`].
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

/// The upstream's response, with headers already filtered to the outbound
/// allow-list.
#[derive(Debug, Clone)]
pub struct ProxyResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

/// Forwards [`ProxyRequest`]s to the upstream FHIR server over a shared,
/// timeout-bounded `reqwest` client.
#[derive(Clone)]
pub struct ProxyPipeline {
    client: reqwest::Client,
}

impl ProxyPipeline {
    /// Builds a client with `timeout` applied to every request.
    ///
    /// # Panics
    /// If the underlying TLS backend cannot be initialized.
    #[must_use]
    pub fn new(timeout: std::time::Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to build upstream HTTP client");
        Self { client }
    }

    /// Sends `request` upstream and returns its response, with response
    /// headers filtered to `Content-Type` and `Access-Control-Allow-Origin`.
    #[instrument(skip(self, request), fields(method = %request.method, url = %request.url))]
    pub async fn forward(&self, request: ProxyRequest) -> Result<ProxyResponse, GatewayError> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|e| GatewayError::UpstreamTransport(e.to_string()))?;

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                GatewayError::UpstreamTimeout
            } else {
                GatewayError::UpstreamTransport(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        debug!(status, "upstream responded");

        let headers = response
            .headers()
            .iter()
            .filter(|(name, _)| {
                RESPONSE_HEADER_ALLOW_LIST
                    .iter()
                    .any(|allowed| allowed.eq_ignore_ascii_case(name.as_str()))
            })
            .map(|(name, value)| {
                (
                    name.to_string(),
                    value.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect();

        let body = response
            .bytes()
            .await
            .map_err(|e| GatewayError::UpstreamTransport(e.to_string()))?
            .to_vec();

        Ok(ProxyResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn forwards_get_and_passes_status_and_body_through() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/Observation"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("{\"resourceType\":\"Bundle\"}")
                    .insert_header("Content-Type", "application/fhir+json")
                    .insert_header("X-Internal", "secret"),
            )
            .mount(&server)
            .await;

        let pipeline = ProxyPipeline::new(std::time::Duration::from_secs(5));
        let response = pipeline
            .forward(ProxyRequest {
                method: "GET".to_string(),
                url: format!("{}/Observation", server.uri()),
                headers: vec![],
                body: vec![],
            })
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.body, b"{\"resourceType\":\"Bundle\"}");
        assert!(response.headers.iter().any(|(k, v)| k == "content-type" && v == "application/fhir+json"));
        assert!(!response.headers.iter().any(|(k, _)| k == "x-internal"));
    }

    #[tokio::test]
    async fn surfaces_upstream_error_status_unchanged() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/Observation/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let pipeline = ProxyPipeline::new(std::time::Duration::from_secs(5));
        let response = pipeline
            .forward(ProxyRequest {
                method: "GET".to_string(),
                url: format!("{}/Observation/missing", server.uri()),
                headers: vec![],
                body: vec![],
            })
            .await
            .unwrap();

        assert_eq!(response.status, 404);
    }

    #[tokio::test]
    async fn unreachable_host_is_reported_as_transport_error() {
        let pipeline = ProxyPipeline::new(std::time::Duration::from_millis(200));
        let err = pipeline
            .forward(ProxyRequest {
                method: "GET".to_string(),
                url: "http://127.0.0.1:1".to_string(),
                headers: vec![],
                body: vec![],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::UpstreamTransport(_)));
    }
}
