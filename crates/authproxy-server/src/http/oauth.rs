//! The `/oauth/*` blueprint: registration, the token endpoint, the
//! authorize endpoint's SMART-aware consent contract, and the admin-only
//! debug endpoints.

use std::collections::{BTreeMap, BTreeSet};

use axum::{
    Json,
    extract::{Path, Query, State},
    response::Redirect,
};
use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use authproxy_auth::{AuthError, DebugTokenRequest};
use authproxy_storage::Patient;

use crate::error::ApiError;
use crate::http::session::{AdminKey, AuthenticatedUser};
use crate::state::AppState;

// -- Registration -----------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    client_name: Option<String>,
    redirect_uris: Vec<String>,
    #[serde(default)]
    scope: String,
}

pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<(axum::http::StatusCode, Json<authproxy_auth::ClientRegistration>), ApiError> {
    let scopes: BTreeSet<String> = request.scope.split_whitespace().map(str::to_string).collect();
    let registration = state
        .registry
        .register(request.redirect_uris, scopes, request.client_name)
        .await?;
    Ok((axum::http::StatusCode::CREATED, Json(registration)))
}

// -- Error landing page ------------------------------------------------------

pub async fn errors(Query(params): Query<BTreeMap<String, String>>) -> Json<BTreeMap<String, String>> {
    Json(params)
}

// -- Token endpoint -----------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    grant_type: String,
    client_id: Option<String>,
    code: Option<String>,
    refresh_token: Option<String>,
}

pub async fn token_post(
    State(state): State<AppState>,
    axum::extract::Form(request): axum::extract::Form<TokenRequest>,
) -> Result<Json<authproxy_auth::TokenResponse>, ApiError> {
    issue_token(state, request).await
}

pub async fn token_get(
    State(state): State<AppState>,
    Query(request): Query<TokenRequest>,
) -> Result<Json<authproxy_auth::TokenResponse>, ApiError> {
    issue_token(state, request).await
}

async fn issue_token(
    state: AppState,
    request: TokenRequest,
) -> Result<Json<authproxy_auth::TokenResponse>, ApiError> {
    let response = match request.grant_type.as_str() {
        "authorization_code" => {
            let client_id = request.client_id.ok_or_else(|| ApiError::BadRequest {
                message: "client_id is required".to_string(),
            })?;
            let code = request.code.ok_or_else(|| ApiError::BadRequest {
                message: "code is required".to_string(),
            })?;
            state.engine.issue_token(&client_id, &code).await?
        }
        "refresh_token" => {
            let refresh_token = request.refresh_token.ok_or_else(|| ApiError::BadRequest {
                message: "refresh_token is required".to_string(),
            })?;
            state.engine.refresh(&refresh_token).await?
        }
        other => {
            return Err(ApiError::BadRequest {
                message: format!("unsupported_grant_type: {other}"),
            });
        }
    };
    Ok(Json(response))
}

// -- Authorize endpoint -------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct AuthorizeQuery {
    redirect_uri: Option<String>,
    scope: Option<String>,
    state: Option<String>,
    client_id: Option<String>,
    patient_id: Option<String>,
}

#[derive(Serialize)]
struct DelegationPrompt {
    decision_required: &'static str,
    patients: Vec<Patient>,
}

#[derive(Serialize)]
struct AuthorizePrompt {
    decision_required: &'static str,
    client_id: String,
    client_name: String,
    patient: Patient,
    today: String,
    expires_default: String,
    abort_uri: String,
}

/// Resolves the query contract (`redirect_uri`/`scope`/`state` required,
/// `patient_id` optional) and, if the caller has not already selected a
/// patient to authorize on behalf of, returns a delegation prompt instead of
/// an authorize prompt. Rendering either as HTML is the session layer's job;
/// this returns the data such a layer needs.
pub async fn authorize_get(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Query(query): Query<AuthorizeQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let redirect_uri = query.redirect_uri.ok_or_else(|| ApiError::BadRequest {
        message: "Missing redirect_uri.".to_string(),
    })?;
    let scope = query.scope.ok_or_else(|| ApiError::BadRequest {
        message: "Missing scope.".to_string(),
    })?;
    let _oauth_state = query.state.ok_or_else(|| ApiError::BadRequest {
        message: "Missing state.".to_string(),
    })?;
    let client_id = query.client_id.ok_or_else(|| ApiError::BadRequest {
        message: "Missing client_id.".to_string(),
    })?;

    let patients = state
        .store
        .list_patients_for_user(user.id)
        .await
        .map_err(AuthError::from)?;

    let resolved_patient_id = query
        .patient_id
        .or_else(|| patients.iter().find(|p| p.is_user).map(|p| p.patient_id.clone()));

    let Some(resolved_patient_id) = resolved_patient_id else {
        return Ok(Json(serde_json::to_value(DelegationPrompt {
            decision_required: "delegate",
            patients,
        }).unwrap()));
    };

    let patient = patients
        .into_iter()
        .find(|p| p.patient_id == resolved_patient_id)
        .ok_or_else(|| ApiError::BadRequest {
            message: "Invalid patient id.".to_string(),
        })?;

    let client = state
        .registry
        .lookup(&client_id)
        .await?
        .ok_or_else(|| AuthError::InvalidClient {
            client_id: client_id.clone(),
        })?;

    let now = state.clock.now();
    let abort_uri = format!(
        "{redirect_uri}{}error=access_denied",
        if redirect_uri.contains('?') { "&" } else { "?" }
    );

    let _ = scope; // carried through to the POST step by the external form, not validated here.

    Ok(Json(serde_json::to_value(AuthorizePrompt {
        decision_required: "authorize",
        client_id: client.client_id,
        client_name: client.name,
        patient,
        today: now.format(&Rfc3339).unwrap_or_default(),
        expires_default: (now + time::Duration::days(365))
            .format(&Rfc3339)
            .unwrap_or_default(),
        abort_uri,
    }).unwrap()))
}

#[derive(Debug, Deserialize)]
pub struct AuthorizeDecision {
    client_id: String,
    redirect_uri: String,
    scope: String,
    state: String,
    patient_id: Option<String>,
    #[serde(default)]
    security_labels: Vec<String>,
    /// RFC 3339 timestamp the user's consent expires at.
    expires: String,
}

/// The consent decision: `current_user` has already been authenticated by
/// the session layer (see [`AuthenticatedUser`]); CSRF protection on this
/// state-changing POST is likewise the session layer's responsibility.
pub async fn authorize_post(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(decision): Json<AuthorizeDecision>,
) -> Result<Redirect, ApiError> {
    let expires = OffsetDateTime::parse(&decision.expires, &Rfc3339).map_err(|e| ApiError::BadRequest {
        message: format!("expires does not parse as RFC 3339: {e}"),
    })?;
    let now = state.clock.now();
    let approval_lifetime = expires - now;

    let security_labels: BTreeSet<String> = decision.security_labels.into_iter().collect();
    state
        .engine
        .create_authorization(&decision.client_id, user.id, decision.patient_id, security_labels, approval_lifetime)
        .await?;

    let scopes: BTreeSet<String> = decision.scope.split_whitespace().map(str::to_string).collect();
    let outcome = state
        .engine
        .authorize(&decision.client_id, user.id, decision.redirect_uri, scopes, Some(&decision.state))
        .await?;

    Ok(Redirect::to(&outcome.redirect_uri))
}

// -- Admin-only debug endpoints ------------------------------------------------

#[derive(Serialize)]
pub struct DebugTokenResponse {
    access_token: String,
    refresh_token: String,
}

pub async fn debug_token(
    State(state): State<AppState>,
    _admin: AdminKey,
    Json(request): Json<DebugTokenRequest>,
) -> Result<Json<DebugTokenResponse>, ApiError> {
    let token = state.engine.debug_issue(request).await?;
    Ok(Json(DebugTokenResponse {
        access_token: token.access_token.unwrap_or_default(),
        refresh_token: token.refresh_token.unwrap_or_default(),
    }))
}

pub async fn debug_introspect(
    State(state): State<AppState>,
    _admin: AdminKey,
    Path(token_value): Path<String>,
) -> Result<Json<authproxy_storage::TokenInterest>, ApiError> {
    let token = match state.store.find_token_by_access(&token_value).await.map_err(AuthError::from)? {
        Some(token) => token,
        None => state
            .store
            .find_token_by_refresh(&token_value)
            .await
            .map_err(AuthError::from)?
            .ok_or(AuthError::NoToken)?,
    };
    let user = state
        .store
        .find_user_by_id(token.user_id)
        .await
        .map_err(AuthError::from)?
        .ok_or_else(|| AuthError::NoUser {
            username: token.user_id.to_string(),
        })?;
    Ok(Json(token.interest(&user.username)))
}
