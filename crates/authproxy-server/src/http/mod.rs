//! HTTP surface: route wiring for the OAuth and FHIR-proxy blueprints.

pub mod fhir;
pub mod oauth;
pub mod session;

use std::time::Duration;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Builds the full router over `state`, with a request-scoped tracing span
/// per the ambient observability contract.
pub fn build_router(state: AppState) -> Router {
    let oauth_routes = Router::new()
        .route("/oauth/register", post(oauth::register))
        .route("/oauth/errors", get(oauth::errors))
        .route("/oauth/token", get(oauth::token_get).post(oauth::token_post))
        .route("/oauth/authorize", get(oauth::authorize_get).post(oauth::authorize_post))
        .route("/oauth/debug/token", post(oauth::debug_token))
        .route("/oauth/debug/introspect/{token}", get(oauth::debug_introspect));

    let api_routes = Router::new()
        .route("/api/me", get(fhir::me))
        .route("/api/fhir/metadata", get(fhir::metadata))
        .route(
            "/api/fhir/{*path}",
            get(fhir::fhir_proxy).post(fhir::fhir_proxy),
        )
        .route(
            "/api/open-fhir/{*path}",
            get(fhir::open_fhir_proxy).post(fhir::open_fhir_proxy),
        );

    Router::new()
        .merge(oauth_routes)
        .merge(api_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http.request",
                        method = %req.method(),
                        path = %req.uri().path(),
                        request_id = %uuid::Uuid::new_v4(),
                    )
                })
                .on_response(|res: &axum::http::Response<_>, latency: Duration, _span: &tracing::Span| {
                    tracing::info!(status = res.status().as_u16(), elapsed_ms = latency.as_millis() as u64, "request handled");
                }),
        )
        .with_state(state)
}
