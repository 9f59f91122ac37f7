//! The `/api/*` blueprint: the bearer-protected profile endpoint, the
//! rewritten capability statement, and the bearer-protected / unsecured
//! FHIR proxies.

use std::collections::BTreeMap;

use axum::{
    body::Bytes,
    extract::{Path, RawQuery, State},
    http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;

use authproxy_auth::AuthError;
use authproxy_gateway::{ProxyRequest, ProxyResponse};

use crate::error::ApiError;
use crate::http::session::BearerToken;
use crate::state::AppState;

#[derive(Serialize)]
pub struct MeResponse {
    client_id: String,
    tokens: Vec<authproxy_storage::TokenInterest>,
}

pub async fn me(
    State(state): State<AppState>,
    BearerToken(access_token): BearerToken,
) -> Result<axum::Json<MeResponse>, ApiError> {
    let token = state.engine.verify_token(&access_token).await?;
    let user = state
        .store
        .find_user_by_id(token.user_id)
        .await
        .map_err(AuthError::from)?
        .ok_or_else(|| AuthError::NoUser {
            username: token.user_id.to_string(),
        })?;
    let tokens = state.engine.authorizations_for(token.user_id).await?;
    let interests = tokens.iter().map(|t| t.interest(&user.username)).collect();
    Ok(axum::Json(MeResponse {
        client_id: token.client_id,
        tokens: interests,
    }))
}

pub async fn metadata(State(state): State<AppState>) -> Result<axum::Json<serde_json::Value>, ApiError> {
    let base = state.config.base_url.clone().unwrap_or_default();
    let mut extensions = BTreeMap::new();
    extensions.insert("authorize".to_string(), format!("{base}/oauth/authorize"));
    extensions.insert("token".to_string(), format!("{base}/oauth/token"));
    extensions.insert("register".to_string(), format!("{base}/oauth/register"));

    let metadata_url = format!("{}/metadata", state.config.api_server.trim_end_matches('/'));
    let document = state.conformance.conformance(&metadata_url, &extensions).await?;
    Ok(axum::Json(document))
}

/// Bearer-protected proxy: verifies the token, runs it through
/// `RequestGuard` and `SecurityTagger`, then forwards upstream.
pub async fn fhir_proxy(
    State(state): State<AppState>,
    BearerToken(access_token): BearerToken,
    method: Method,
    Path(path): Path<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let token = state.engine.verify_token(&access_token).await?;

    let incoming_query = parse_query(query.as_deref());
    state
        .guard
        .check(method.as_str(), &path, incoming_query.iter().map(|(k, _)| k.as_str()))?;

    let tagged_query = state.tagger.prepare_query(&path, &incoming_query, Some(&token));
    let incoming_headers = header_map_to_pairs(&headers);
    let outbound_headers = state.tagger.filter_headers(&incoming_headers);

    let response = forward(&state, method, &path, &tagged_query, outbound_headers, body).await?;
    Ok(response_to_axum(response))
}

/// Unsecured proxy: no bearer verification, no `RequestGuard`, no
/// `SecurityTagger` — caller-supplied headers and query parameters pass
/// through verbatim. Gated behind `enable_unsecure_fhir`.
pub async fn open_fhir_proxy(
    State(state): State<AppState>,
    method: Method,
    Path(path): Path<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    if !state.config.enable_unsecure_fhir {
        return Err(ApiError::NotFound {
            message: "unsecured FHIR proxy is disabled".to_string(),
        });
    }

    let incoming_query = parse_query(query.as_deref());
    let incoming_headers = header_map_to_pairs(&headers);
    let response = forward(&state, method, &path, &incoming_query, incoming_headers, body).await?;
    Ok(response_to_axum(response))
}

async fn forward(
    state: &AppState,
    method: Method,
    path: &str,
    query: &[(String, String)],
    headers: Vec<(String, String)>,
    body: Bytes,
) -> Result<ProxyResponse, ApiError> {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (name, value) in query {
        serializer.append_pair(name, value);
    }
    let query_string = serializer.finish();

    let mut url = format!("{}/{}", state.config.api_server.trim_end_matches('/'), path.trim_start_matches('/'));
    if !query_string.is_empty() {
        url.push('?');
        url.push_str(&query_string);
    }

    let response = state
        .pipeline
        .forward(ProxyRequest {
            method: method.to_string(),
            url,
            headers,
            body: body.to_vec(),
        })
        .await?;
    Ok(response)
}

fn parse_query(raw: Option<&str>) -> Vec<(String, String)> {
    url::form_urlencoded::parse(raw.unwrap_or("").as_bytes())
        .into_owned()
        .collect()
}

fn header_map_to_pairs(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| (name.to_string(), value.to_str().unwrap_or_default().to_string()))
        .collect()
}

fn response_to_axum(response: ProxyResponse) -> Response {
    let mut builder = axum::http::Response::builder()
        .status(StatusCode::from_u16(response.status).unwrap_or(StatusCode::BAD_GATEWAY));
    for (name, value) in &response.headers {
        if let (Ok(name), Ok(value)) = (HeaderName::try_from(name.as_str()), HeaderValue::try_from(value.as_str())) {
            builder = builder.header(name, value);
        }
    }
    builder
        .body(axum::body::Body::from(response.body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
