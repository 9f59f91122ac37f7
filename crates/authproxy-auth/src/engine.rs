//! Grant lifecycle, token issuance/refresh, approval-window enforcement,
//! SMART credential augmentation, and token revocation.

use std::{collections::BTreeSet, sync::Arc};

use authproxy_core::{Clock, generate_id};
use authproxy_storage::{CasOutcome, Client, Grant, Store, Token, TokenInterest};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::{config::OAuthConfig, error::AuthError};

/// A grant paired with the redirect URL its authorization response should
/// carry the code on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationOutcome {
    pub grant: Grant,
    pub redirect_uri: String,
}

/// The JSON body returned by the token endpoint on success, including the
/// SMART `patient` launch context field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub refresh_token: String,
    pub scope: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patient: Option<String>,
}

/// Input to the privileged debug token endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct DebugTokenRequest {
    pub client_id: String,
    /// Raw request input; validated as a non-negative integer of seconds.
    pub access_lifetime: String,
    /// Raw request input; validated as a non-negative integer of seconds.
    pub approval_expires: String,
    pub scope: String,
    pub username: String,
    pub patient_id: String,
}

/// The OAuth 2.0 authorization engine.
pub struct OAuthEngine {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    config: OAuthConfig,
}

impl OAuthEngine {
    /// Builds an engine backed by `store`, reading the current time
    /// through `clock` so tests can drive expiry deterministically.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, config: OAuthConfig) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    fn now(&self) -> OffsetDateTime {
        self.clock.now()
    }

    /// Backoff for the `attempt`-th CAS retry: a base delay that doubles per
    /// attempt, plus up to 10ms of jitter so concurrent losers don't all
    /// retry in lockstep.
    fn jittered_backoff(attempt: u32) -> std::time::Duration {
        let base_ms = 5u64.saturating_mul(1u64 << attempt.min(4));
        let jitter_ms = rand::Rng::gen_range(&mut rand::thread_rng(), 0..10);
        std::time::Duration::from_millis(base_ms + jitter_ms)
    }

    // -- Grant flow -------------------------------------------------------

    /// Creates a single-use authorization code for an authenticated user.
    ///
    /// # Errors
    /// [`AuthError::ServiceUnavailable`] on a storage failure.
    pub async fn create_grant(
        &self,
        client_id: &str,
        user_id: i64,
        redirect_uri: String,
        scopes: BTreeSet<String>,
    ) -> Result<Grant, AuthError> {
        let grant = Grant {
            id: Uuid::new_v4(),
            client_id: client_id.to_string(),
            user_id,
            code: generate_id(),
            redirect_uri,
            scopes,
            expires: self.now() + Duration::seconds(self.config.grant_lifetime.as_secs() as i64),
        };
        self.store.create_grant(grant.clone()).await?;
        Ok(grant)
    }

    /// Creates a grant and the redirect URL its authorization code should
    /// be delivered on, per RFC 6749's authorization response.
    ///
    /// # Errors
    /// [`AuthError::ServiceUnavailable`] on a storage failure.
    pub async fn authorize(
        &self,
        client_id: &str,
        user_id: i64,
        redirect_uri: String,
        scopes: BTreeSet<String>,
        state: Option<&str>,
    ) -> Result<AuthorizationOutcome, AuthError> {
        let grant = self
            .create_grant(client_id, user_id, redirect_uri.clone(), scopes)
            .await?;
        let mut url = format!("{redirect_uri}?code={}", grant.code);
        if let Some(state) = state {
            url.push_str("&state=");
            url.push_str(state);
        }
        Ok(AuthorizationOutcome {
            grant,
            redirect_uri: url,
        })
    }

    /// Loads a grant, treating an expired one as absent.
    ///
    /// # Errors
    /// [`AuthError::ServiceUnavailable`] on a storage failure.
    pub async fn load_grant(&self, client_id: &str, code: &str) -> Result<Option<Grant>, AuthError> {
        Ok(self.store.find_grant(client_id, code, self.now()).await?)
    }

    // -- Token issuance / refresh ------------------------------------------

    /// Exchanges an authorization code for a token (the `authorization_code`
    /// grant type).
    ///
    /// # Errors
    /// [`AuthError::InvalidGrant`] if the code is unknown or expired;
    /// [`AuthError::NoClient`] if the client no longer exists;
    /// [`AuthError::ServiceUnavailable`] on a storage failure or exhausted
    /// retry budget.
    pub async fn issue_token(
        &self,
        client_id: &str,
        code: &str,
    ) -> Result<TokenResponse, AuthError> {
        let grant = self
            .load_grant(client_id, code)
            .await?
            .ok_or_else(|| AuthError::InvalidGrant {
                message: "unknown or expired authorization code".to_string(),
            })?;
        self.store.consume_grant(grant.id, self.now()).await?;

        let client = self
            .store
            .find_client(client_id)
            .await?
            .ok_or_else(|| AuthError::NoClient {
                client_id: client_id.to_string(),
            })?;

        let token = self
            .issue_or_replace(client_id, grant.user_id, grant.scopes.clone(), &client)
            .await?;

        Ok(self.to_token_response(&token))
    }

    /// Refreshes an access token (the `refresh_token` grant type).
    ///
    /// # Errors
    /// [`AuthError::InvalidGrant`] if the refresh token is unknown or its
    /// approval window has passed; [`AuthError::ServiceUnavailable`] on a
    /// storage failure or exhausted retry budget.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, AuthError> {
        let basis = self
            .store
            .find_token_by_refresh(refresh_token)
            .await?
            .ok_or_else(|| AuthError::InvalidGrant {
                message: "unknown refresh token".to_string(),
            })?;
        if basis.approval_expired(self.now()) {
            return Err(AuthError::InvalidGrant {
                message: "refresh token's approval window has expired".to_string(),
            });
        }

        let client = self
            .store
            .find_client(&basis.client_id)
            .await?
            .ok_or_else(|| AuthError::NoClient {
                client_id: basis.client_id.clone(),
            })?;

        let token = self
            .issue_or_replace(&basis.client_id, basis.user_id, basis.scopes.clone(), &client)
            .await?;

        Ok(self.to_token_response(&token))
    }

    /// Finds the basis token (if any), builds a new issued token on top of
    /// it, and atomically swaps it in, retrying on a lost compare-and-swap
    /// race up to `config.max_cas_retries` times.
    async fn issue_or_replace(
        &self,
        client_id: &str,
        user_id: i64,
        scopes: BTreeSet<String>,
        client: &Client,
    ) -> Result<Token, AuthError> {
        let now = self.now();
        let mut attempt = 0u32;
        loop {
            let basis = self.store.find_basis_token(client_id, user_id, now).await?;
            let (approval_expires, patient_id, security_labels) = match &basis {
                Some(b) => (b.approval_expires, b.patient_id.clone(), b.security_labels.clone()),
                None => (
                    now + Duration::seconds(self.config.approval_window.as_secs() as i64),
                    None,
                    client.security_labels.clone(),
                ),
            };

            let new_token = Token {
                id: Uuid::new_v4(),
                client_id: client_id.to_string(),
                user_id,
                patient_id,
                token_type: Token::token_type().to_string(),
                access_token: Some(generate_id()),
                refresh_token: Some(generate_id()),
                scopes: scopes.clone(),
                security_labels,
                expires: Some(now + Duration::seconds(self.config.access_token_lifetime.as_secs() as i64)),
                approval_expires,
                created_at: now,
            };

            let outcome = self
                .store
                .replace_client_user_tokens(
                    client_id,
                    user_id,
                    now,
                    basis.as_ref().map(|b| b.id),
                    new_token,
                )
                .await?;

            match outcome {
                CasOutcome::Applied(token) => return Ok(token),
                CasOutcome::Conflict => {
                    attempt += 1;
                    if attempt >= self.config.max_cas_retries {
                        return Err(AuthError::ServiceUnavailable(
                            authproxy_storage::StorageError::Conflict {
                                client_id: client_id.to_string(),
                                user_id,
                            },
                        ));
                    }
                    let backoff = Self::jittered_backoff(attempt);
                    tracing::debug!(
                        client_id,
                        user_id,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        "token issuance CAS conflict, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    fn to_token_response(&self, token: &Token) -> TokenResponse {
        TokenResponse {
            access_token: token.access_token.clone().unwrap_or_default(),
            token_type: token.token_type.clone(),
            expires_in: token
                .expires
                .map(|e| (e - self.now()).whole_seconds())
                .unwrap_or_default(),
            refresh_token: token.refresh_token.clone().unwrap_or_default(),
            scope: token.scopes.iter().cloned().collect::<Vec<_>>().join(" "),
            patient: token.patient_id.clone(),
        }
    }

    // -- Authorization pre-creation (consent) ------------------------------

    /// Records that the user has consented: deletes all existing tokens for
    /// `client_id` and creates a preauthorized token (no access/refresh
    /// fields yet) carrying the approval window a subsequent `issue_token`
    /// will build on top of.
    ///
    /// # Errors
    /// [`AuthError::ServiceUnavailable`] on a storage failure.
    pub async fn create_authorization(
        &self,
        client_id: &str,
        user_id: i64,
        patient_id: Option<String>,
        security_labels: BTreeSet<String>,
        approval_lifetime: Duration,
    ) -> Result<Token, AuthError> {
        let now = self.now();
        let token = Token {
            id: Uuid::new_v4(),
            client_id: client_id.to_string(),
            user_id,
            patient_id,
            token_type: Token::token_type().to_string(),
            access_token: None,
            refresh_token: None,
            scopes: BTreeSet::new(),
            security_labels,
            expires: None,
            approval_expires: now + approval_lifetime,
            created_at: now,
        };
        Ok(self.store.replace_all_client_tokens(client_id, token).await?)
    }

    // -- Revocation / listing / audit ---------------------------------------

    /// Deletes a token record outright.
    ///
    /// # Errors
    /// [`AuthError::ServiceUnavailable`] on a storage failure.
    pub async fn revoke_token(&self, token_id: Uuid) -> Result<(), AuthError> {
        Ok(self.store.delete_token(token_id).await?)
    }

    /// All tokens (of any lifecycle state) held for `user_id`.
    ///
    /// # Errors
    /// [`AuthError::ServiceUnavailable`] on a storage failure.
    pub async fn authorizations_for(&self, user_id: i64) -> Result<Vec<Token>, AuthError> {
        Ok(self.store.list_tokens_for_user(user_id).await?)
    }

    /// All tokens ever issued to `client_id`, for audit review.
    ///
    /// # Errors
    /// [`AuthError::ServiceUnavailable`] on a storage failure.
    pub async fn audit_client(&self, client_id: &str) -> Result<Vec<Token>, AuthError> {
        Ok(self.store.list_tokens_for_client(client_id).await?)
    }

    // -- Bearer verification (consumed by the gateway) ----------------------

    /// Resolves a bearer token, rejecting one whose access-token expiry has
    /// passed.
    ///
    /// # Errors
    /// [`AuthError::InvalidToken`] if the token is unknown or expired;
    /// [`AuthError::ServiceUnavailable`] on a storage failure.
    pub async fn verify_token(&self, access_token: &str) -> Result<Token, AuthError> {
        let token = self
            .store
            .find_token_by_access(access_token)
            .await?
            .ok_or_else(|| AuthError::InvalidToken {
                message: "unknown access token".to_string(),
            })?;
        if let Some(expires) = token.expires {
            if self.now() >= expires {
                return Err(AuthError::InvalidToken {
                    message: "access token has expired".to_string(),
                });
            }
        }
        Ok(token)
    }

    // -- Introspection ------------------------------------------------------

    /// Resolves a token by access or refresh value, for the debug
    /// introspection endpoint.
    ///
    /// # Errors
    /// [`AuthError::NoToken`] if neither lookup matches;
    /// [`AuthError::ServiceUnavailable`] on a storage failure.
    pub async fn introspect(&self, token_value: &str, username: &str) -> Result<TokenInterest, AuthError> {
        let token = match self.store.find_token_by_access(token_value).await? {
            Some(t) => t,
            None => self
                .store
                .find_token_by_refresh(token_value)
                .await?
                .ok_or(AuthError::NoToken)?,
        };
        Ok(token.interest(username))
    }

    // -- Debug issuance -------------------------------------------------------

    /// Mints a token directly, bypassing the grant/consent flow. Privileged;
    /// the caller is responsible for gating this behind an admin check.
    ///
    /// # Errors
    /// [`AuthError::NoUser`], [`AuthError::NoClient`], [`AuthError::NoPatient`],
    /// [`AuthError::NoPatientForUser`] if the referenced rows don't resolve
    /// the way the request claims; [`AuthError::MalformedLifetime`] /
    /// [`AuthError::MalformedExpiration`] if the numeric fields don't
    /// parse; [`AuthError::ServiceUnavailable`] on a storage failure.
    pub async fn debug_issue(&self, request: DebugTokenRequest) -> Result<Token, AuthError> {
        let access_lifetime: i64 = request
            .access_lifetime
            .parse()
            .ok()
            .filter(|v| *v >= 0)
            .ok_or_else(|| AuthError::MalformedLifetime {
                value: request.access_lifetime.clone(),
            })?;
        let approval_lifetime: i64 = request
            .approval_expires
            .parse()
            .ok()
            .filter(|v| *v >= 0)
            .ok_or_else(|| AuthError::MalformedExpiration {
                value: request.approval_expires.clone(),
            })?;

        let user = self
            .store
            .find_user_by_username(&request.username)
            .await?
            .ok_or_else(|| AuthError::NoUser {
                username: request.username.clone(),
            })?;
        let client = self
            .store
            .find_client(&request.client_id)
            .await?
            .ok_or_else(|| AuthError::NoClient {
                client_id: request.client_id.clone(),
            })?;
        let patient = self
            .store
            .find_patient_by_fhir_id(&request.patient_id)
            .await?
            .ok_or_else(|| AuthError::NoPatient {
                patient_id: request.patient_id.clone(),
            })?;
        if patient.user_id != user.id {
            return Err(AuthError::NoPatientForUser {
                patient_id: request.patient_id.clone(),
                user_id: user.id,
            });
        }

        let now = self.now();
        let scopes: BTreeSet<String> = request
            .scope
            .split_whitespace()
            .map(str::to_string)
            .collect();
        let token = Token {
            id: Uuid::new_v4(),
            client_id: request.client_id.clone(),
            user_id: user.id,
            patient_id: Some(patient.patient_id),
            token_type: Token::token_type().to_string(),
            access_token: Some(generate_id()),
            refresh_token: Some(generate_id()),
            scopes,
            security_labels: client.security_labels.clone(),
            expires: Some(now + Duration::seconds(access_lifetime)),
            approval_expires: now + Duration::seconds(approval_lifetime),
            created_at: now,
        };
        Ok(self
            .store
            .replace_all_client_tokens(&request.client_id, token)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use authproxy_core::time::FixedClock;
    use authproxy_storage::InMemoryStore;

    fn store() -> Arc<InMemoryStore> {
        Arc::new(InMemoryStore::new())
    }

    fn engine(store: Arc<dyn Store>, clock: Arc<FixedClock>) -> OAuthEngine {
        OAuthEngine::new(store, clock, OAuthConfig::default())
    }

    async fn seed_client(store: &InMemoryStore, client_id: &str) {
        store
            .create_client(Client {
                client_id: client_id.to_string(),
                client_secret: "secret".into(),
                name: "acme".into(),
                redirect_uris: vec!["https://acme/cb".into()],
                default_scopes: BTreeSet::new(),
                security_labels: ["patient".to_string()].into_iter().collect(),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn grant_expires_after_configured_lifetime() {
        let backend = store();
        let clock = Arc::new(FixedClock::new(OffsetDateTime::now_utc()));
        seed_client(&backend, "c1").await;
        let eng = engine(backend.clone(), clock.clone());

        let grant = eng
            .create_grant("c1", 1, "https://acme/cb".into(), BTreeSet::new())
            .await
            .unwrap();
        assert!(eng.load_grant("c1", &grant.code).await.unwrap().is_some());

        clock.advance(Duration::seconds(101));
        assert!(eng.load_grant("c1", &grant.code).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn issue_token_consumes_the_grant() {
        let backend = store();
        let clock = Arc::new(FixedClock::new(OffsetDateTime::now_utc()));
        seed_client(&backend, "c1").await;
        let eng = engine(backend.clone(), clock.clone());

        let grant = eng
            .create_grant("c1", 1, "https://acme/cb".into(), BTreeSet::new())
            .await
            .unwrap();
        let response = eng.issue_token("c1", &grant.code).await.unwrap();
        assert!(!response.access_token.is_empty());
        assert_eq!(response.expires_in, 3600);

        let err = eng.issue_token("c1", &grant.code).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidGrant { .. }));
    }

    #[tokio::test]
    async fn issue_token_preserves_prior_approval_window_and_patient() {
        let backend = store();
        let clock = Arc::new(FixedClock::new(OffsetDateTime::now_utc()));
        seed_client(&backend, "c1").await;
        let eng = engine(backend.clone(), clock.clone());

        let pre = eng
            .create_authorization(
                "c1",
                1,
                Some("smart-1".into()),
                ["medications".to_string()].into_iter().collect(),
                Duration::days(365),
            )
            .await
            .unwrap();

        let grant = eng
            .create_grant("c1", 1, "https://acme/cb".into(), BTreeSet::new())
            .await
            .unwrap();
        let response = eng.issue_token("c1", &grant.code).await.unwrap();
        assert_eq!(response.patient.as_deref(), Some("smart-1"));

        let remaining = eng.audit_client("c1").await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].approval_expires, pre.approval_expires);
        assert_ne!(remaining[0].id, pre.id);
    }

    #[tokio::test]
    async fn refresh_fails_once_approval_window_has_passed() {
        let backend = store();
        let clock = Arc::new(FixedClock::new(OffsetDateTime::now_utc()));
        seed_client(&backend, "c1").await;
        let eng = engine(backend.clone(), clock.clone());

        eng.create_authorization("c1", 1, None, BTreeSet::new(), Duration::seconds(10))
            .await
            .unwrap();
        let grant = eng
            .create_grant("c1", 1, "https://acme/cb".into(), BTreeSet::new())
            .await
            .unwrap();
        let issued = eng.issue_token("c1", &grant.code).await.unwrap();

        clock.advance(Duration::seconds(20));
        let err = eng.refresh(&issued.refresh_token).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidGrant { .. }));
    }

    #[tokio::test]
    async fn debug_issue_rejects_patient_owned_by_someone_else() {
        let backend = store();
        let clock = Arc::new(FixedClock::new(OffsetDateTime::now_utc()));
        seed_client(&backend, "c1").await;
        backend
            .create_user(authproxy_storage::User {
                id: 1,
                username: "alice".into(),
                password_hash: "x".into(),
                name: "Alice".into(),
            })
            .await
            .unwrap();
        backend
            .create_patient(authproxy_storage::Patient {
                id: 1,
                patient_id: "smart-1".into(),
                name: "Bob".into(),
                is_user: false,
                user_id: 2,
            })
            .await
            .unwrap();
        let eng = engine(backend.clone(), clock.clone());

        let err = eng
            .debug_issue(DebugTokenRequest {
                client_id: "c1".into(),
                access_lifetime: "3600".into(),
                approval_expires: "31536000".into(),
                scope: "patient/*.read".into(),
                username: "alice".into(),
                patient_id: "smart-1".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::NoPatientForUser { .. }));
    }

    #[tokio::test]
    async fn debug_issue_rejects_malformed_lifetime() {
        let backend = store();
        let clock = Arc::new(FixedClock::new(OffsetDateTime::now_utc()));
        seed_client(&backend, "c1").await;
        let eng = engine(backend.clone(), clock.clone());

        let err = eng
            .debug_issue(DebugTokenRequest {
                client_id: "c1".into(),
                access_lifetime: "not-a-number".into(),
                approval_expires: "3600".into(),
                scope: String::new(),
                username: "alice".into(),
                patient_id: "smart-1".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::MalformedLifetime { .. }));
    }

    #[tokio::test]
    async fn verify_token_rejects_expired_access_token() {
        let backend = store();
        let clock = Arc::new(FixedClock::new(OffsetDateTime::now_utc()));
        seed_client(&backend, "c1").await;
        let eng = engine(backend.clone(), clock.clone());

        let grant = eng
            .create_grant("c1", 1, "https://acme/cb".into(), BTreeSet::new())
            .await
            .unwrap();
        let issued = eng.issue_token("c1", &grant.code).await.unwrap();
        assert!(eng.verify_token(&issued.access_token).await.is_ok());

        clock.advance(Duration::seconds(3601));
        assert!(matches!(
            eng.verify_token(&issued.access_token).await.unwrap_err(),
            AuthError::InvalidToken { .. }
        ));
    }

    #[tokio::test]
    async fn introspect_finds_token_by_refresh_value_too() {
        let backend = store();
        let clock = Arc::new(FixedClock::new(OffsetDateTime::now_utc()));
        seed_client(&backend, "c1").await;
        let eng = engine(backend.clone(), clock.clone());

        let grant = eng
            .create_grant("c1", 1, "https://acme/cb".into(), BTreeSet::new())
            .await
            .unwrap();
        let issued = eng.issue_token("c1", &grant.code).await.unwrap();

        let interest = eng
            .introspect(&issued.refresh_token, "alice")
            .await
            .unwrap();
        assert_eq!(interest.access_token.as_deref(), Some(issued.access_token.as_str()));

        let err = eng.introspect("nope", "alice").await.unwrap_err();
        assert!(matches!(err, AuthError::NoToken));
    }
}
