//! End-to-end tests driving the full router over real HTTP, the way the
//! rest of this codebase's integration suites spawn a server and talk to it
//! with `reqwest`. The upstream FHIR server is stood in for by `wiremock`.

use std::sync::Arc;

use authproxy_core::SystemClock;
use authproxy_server::state::AppState;
use authproxy_server::{Config, http::build_router};
use authproxy_storage::{InMemoryStore, Patient, Store, User};
use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn spawn(config: Config, store: Arc<dyn Store>) -> String {
    let clock = Arc::new(SystemClock);
    let state = AppState::new(config, store, clock);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind((std::net::Ipv4Addr::LOCALHOST, 0))
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}")
}

fn base_config(upstream: &str) -> Config {
    let mut config = Config::default();
    config.api_server = upstream.to_string();
    config.secret_key = "a very long admin secret key indeed".to_string();
    config
}

#[tokio::test]
async fn registration_round_trips_and_rejects_schemeless_redirects() {
    let base = spawn(base_config("https://unused.example.org"), Arc::new(InMemoryStore::new())).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/oauth/register"))
        .json(&json!({"client_name": "acme", "redirect_uris": ["https://acme/cb"], "scope": "patient/*.read"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::CREATED);
    let registration: Value = resp.json().await.unwrap();
    assert_eq!(registration["client_name"], "acme");
    assert_eq!(registration["client_secret_expires_at"], 0);
    assert!(!registration["client_id"].as_str().unwrap().is_empty());

    let resp = client
        .post(format!("{base}/oauth/register"))
        .json(&json!({"redirect_uris": ["/no-scheme"], "scope": ""}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "invalid_redirect_uri");
}

#[tokio::test]
async fn proxy_rejects_disallowed_query_parameter_without_calling_upstream() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/Observation"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&upstream)
        .await;

    let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
    store
        .create_user(User {
            id: 1,
            username: "alice".to_string(),
            password_hash: String::new(),
            name: "Alice".to_string(),
        })
        .await
        .unwrap();
    store
        .create_patient(Patient {
            id: 1,
            patient_id: "smart-1".to_string(),
            name: "Alice Patient".to_string(),
            is_user: true,
            user_id: 1,
        })
        .await
        .unwrap();

    let base = spawn(base_config(&upstream.uri()), store.clone()).await;
    let client = reqwest::Client::new();

    let registration: Value = client
        .post(format!("{base}/oauth/register"))
        .json(&json!({"client_name": "acme", "redirect_uris": ["https://acme/cb"], "scope": "patient/*.read"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let client_id = registration["client_id"].as_str().unwrap();

    let issued: Value = client
        .post(format!("{base}/oauth/debug/token"))
        .header("x-admin-key", "a very long admin secret key indeed")
        .json(&json!({
            "client_id": client_id,
            "access_lifetime": "3600",
            "approval_expires": "3600",
            "scope": "patient/*.read",
            "username": "alice",
            "patient_id": "smart-1",
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let access_token = issued["access_token"].as_str().unwrap();

    let resp = client
        .get(format!("{base}/api/fhir/Observation?bad=1"))
        .header("authorization", format!("Bearer {access_token}"))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), reqwest::StatusCode::FORBIDDEN);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Not allowed to query for \"bad\" parameter.");
    assert!(body.get("description").is_none());
}

#[tokio::test]
async fn capability_statement_is_rewritten_with_smart_extensions() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/metadata"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"rest": [{"security": {}}]})))
        .mount(&upstream)
        .await;

    let base = spawn(base_config(&upstream.uri()), Arc::new(InMemoryStore::new())).await;
    let client = reqwest::Client::new();

    let resp = client.get(format!("{base}/api/fhir/metadata")).send().await.unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    let document: Value = resp.json().await.unwrap();

    let security = &document["rest"][0]["security"];
    assert_eq!(
        security["extension"][0]["url"],
        "http://fhir-registry.smarthealthit.org/StructureDefinition/oauth-uris"
    );
    assert_eq!(security["service"][0]["coding"][0]["code"], "SMART-on-FHIR");
}

#[tokio::test]
async fn authorize_get_without_resolved_patient_asks_for_delegation() {
    let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
    store
        .create_user(User {
            id: 1,
            username: "alice".to_string(),
            password_hash: String::new(),
            name: "Alice".to_string(),
        })
        .await
        .unwrap();
    store
        .create_patient(Patient {
            id: 1,
            patient_id: "smart-1".to_string(),
            name: "Alice Patient".to_string(),
            is_user: false,
            user_id: 1,
        })
        .await
        .unwrap();

    let base = spawn(base_config("https://unused.example.org"), store).await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{base}/oauth/authorize"))
        .query(&[
            ("client_id", "whatever"),
            ("redirect_uri", "https://acme/cb"),
            ("scope", "patient/*.read"),
            ("state", "xyz"),
        ])
        .header("x-auth-user", "alice")
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["decision_required"], "delegate");
    assert_eq!(body["patients"][0]["patient_id"], "smart-1");
}

#[tokio::test]
async fn admin_debug_endpoints_reject_a_missing_or_wrong_key() {
    let base = spawn(base_config("https://unused.example.org"), Arc::new(InMemoryStore::new())).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/oauth/debug/token"))
        .json(&json!({
            "client_id": "c1",
            "access_lifetime": "3600",
            "approval_expires": "3600",
            "scope": "patient/*.read",
            "username": "alice",
            "patient_id": "smart-1",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::UNAUTHORIZED);

    let resp = client
        .post(format!("{base}/oauth/debug/token"))
        .header("x-admin-key", "wrong")
        .json(&json!({
            "client_id": "c1",
            "access_lifetime": "3600",
            "approval_expires": "3600",
            "scope": "patient/*.read",
            "username": "alice",
            "patient_id": "smart-1",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unsecured_fhir_proxy_is_disabled_by_default() {
    let base = spawn(base_config("https://unused.example.org"), Arc::new(InMemoryStore::new())).await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{base}/api/open-fhir/Observation"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn me_requires_a_bearer_token() {
    let base = spawn(base_config("https://unused.example.org"), Arc::new(InMemoryStore::new())).await;
    let client = reqwest::Client::new();

    let resp = client.get(format!("{base}/api/me")).send().await.unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::UNAUTHORIZED);
}
