//! Thread-safe in-memory [`Store`] implementation, for tests and for
//! deployments small enough to run without an external database.

use std::{
    collections::HashMap,
    sync::atomic::{AtomicI64, Ordering},
};

use async_trait::async_trait;
use parking_lot::RwLock;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    error::StorageError,
    traits::{CasOutcome, Store},
    types::{Client, Grant, Patient, Token, User},
};

#[derive(Default)]
struct Tables {
    clients: HashMap<String, Client>,
    users: HashMap<i64, User>,
    patients: HashMap<i64, Patient>,
    grants: HashMap<Uuid, Grant>,
    tokens: HashMap<Uuid, Token>,
}

/// In-memory backend built around a single `RwLock` guarding all five
/// tables, so the "find basis, delete siblings, insert new" unit required
/// by the concurrency model is a single critical section rather than a
/// distributed transaction.
#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
    next_patient_row: AtomicI64,
}

impl InMemoryStore {
    /// Builds an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates the next integer row id for a `Patient`, for callers that
    /// don't already have one (the store does not invent `User` ids, since
    /// accounts are provisioned with an id already known to the caller).
    pub fn next_patient_row_id(&self) -> i64 {
        self.next_patient_row.fetch_add(1, Ordering::Relaxed)
    }

    fn basis_token_locked(tables: &Tables, client_id: &str, user_id: i64, now: OffsetDateTime) -> Option<Token> {
        tables
            .tokens
            .values()
            .filter(|t| t.client_id == client_id && t.user_id == user_id && t.approval_expires >= now)
            .max_by_key(|t| t.approval_expires)
            .cloned()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn create_client(&self, client: Client) -> Result<(), StorageError> {
        self.tables.write().clients.insert(client.client_id.clone(), client);
        Ok(())
    }

    async fn find_client(&self, client_id: &str) -> Result<Option<Client>, StorageError> {
        Ok(self.tables.read().clients.get(client_id).cloned())
    }

    async fn delete_client(&self, client_id: &str) -> Result<(), StorageError> {
        self.tables.write().clients.remove(client_id);
        Ok(())
    }

    async fn create_user(&self, user: User) -> Result<(), StorageError> {
        self.tables.write().users.insert(user.id, user);
        Ok(())
    }

    async fn create_patient(&self, patient: Patient) -> Result<(), StorageError> {
        self.tables.write().patients.insert(patient.id, patient);
        Ok(())
    }

    async fn find_user_by_id(&self, user_id: i64) -> Result<Option<User>, StorageError> {
        Ok(self.tables.read().users.get(&user_id).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StorageError> {
        Ok(self
            .tables
            .read()
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn find_patient(&self, patient_row_id: i64) -> Result<Option<Patient>, StorageError> {
        Ok(self.tables.read().patients.get(&patient_row_id).cloned())
    }

    async fn find_patient_by_fhir_id(&self, patient_id: &str) -> Result<Option<Patient>, StorageError> {
        Ok(self
            .tables
            .read()
            .patients
            .values()
            .find(|p| p.patient_id == patient_id)
            .cloned())
    }

    async fn list_patients_for_user(&self, user_id: i64) -> Result<Vec<Patient>, StorageError> {
        Ok(self
            .tables
            .read()
            .patients
            .values()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn create_grant(&self, grant: Grant) -> Result<(), StorageError> {
        self.tables.write().grants.insert(grant.id, grant);
        Ok(())
    }

    async fn find_grant(
        &self,
        client_id: &str,
        code: &str,
        now: OffsetDateTime,
    ) -> Result<Option<Grant>, StorageError> {
        Ok(self
            .tables
            .read()
            .grants
            .values()
            .find(|g| g.client_id == client_id && g.code == code && g.is_valid(now))
            .cloned())
    }

    async fn consume_grant(&self, grant_id: Uuid, now: OffsetDateTime) -> Result<(), StorageError> {
        let mut tables = self.tables.write();
        match tables.grants.get_mut(&grant_id) {
            Some(grant) => {
                grant.expires = now;
                Ok(())
            }
            None => Err(StorageError::NotFound {
                kind: "grant",
                id: grant_id.to_string(),
            }),
        }
    }

    async fn find_token_by_access(&self, access_token: &str) -> Result<Option<Token>, StorageError> {
        Ok(self
            .tables
            .read()
            .tokens
            .values()
            .find(|t| t.access_token.as_deref() == Some(access_token))
            .cloned())
    }

    async fn find_token_by_refresh(
        &self,
        refresh_token: &str,
    ) -> Result<Option<Token>, StorageError> {
        Ok(self
            .tables
            .read()
            .tokens
            .values()
            .find(|t| t.refresh_token.as_deref() == Some(refresh_token))
            .cloned())
    }

    async fn list_tokens_for_user(&self, user_id: i64) -> Result<Vec<Token>, StorageError> {
        Ok(self
            .tables
            .read()
            .tokens
            .values()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn list_tokens_for_client(&self, client_id: &str) -> Result<Vec<Token>, StorageError> {
        Ok(self
            .tables
            .read()
            .tokens
            .values()
            .filter(|t| t.client_id == client_id)
            .cloned()
            .collect())
    }

    async fn delete_token(&self, token_id: Uuid) -> Result<(), StorageError> {
        self.tables.write().tokens.remove(&token_id);
        Ok(())
    }

    async fn find_basis_token(
        &self,
        client_id: &str,
        user_id: i64,
        now: OffsetDateTime,
    ) -> Result<Option<Token>, StorageError> {
        Ok(Self::basis_token_locked(&self.tables.read(), client_id, user_id, now))
    }

    async fn replace_client_user_tokens(
        &self,
        client_id: &str,
        user_id: i64,
        now: OffsetDateTime,
        expected_basis_id: Option<Uuid>,
        new_token: Token,
    ) -> Result<CasOutcome, StorageError> {
        let mut tables = self.tables.write();
        let current_basis = Self::basis_token_locked(&tables, client_id, user_id, now);
        if current_basis.as_ref().map(|t| t.id) != expected_basis_id {
            return Ok(CasOutcome::Conflict);
        }

        let siblings: Vec<Uuid> = tables
            .tokens
            .values()
            .filter(|t| t.client_id == client_id && t.user_id == user_id && t.approval_expires >= now)
            .map(|t| t.id)
            .collect();
        for id in siblings {
            tables.tokens.remove(&id);
        }
        tables.tokens.insert(new_token.id, new_token.clone());

        tracing::debug!(client_id, user_id, token_id = %new_token.id, "token replaced");
        Ok(CasOutcome::Applied(new_token))
    }

    async fn replace_all_client_tokens(
        &self,
        client_id: &str,
        new_token: Token,
    ) -> Result<Token, StorageError> {
        let mut tables = self.tables.write();
        let siblings: Vec<Uuid> = tables
            .tokens
            .values()
            .filter(|t| t.client_id == client_id)
            .map(|t| t.id)
            .collect();
        for id in siblings {
            tables.tokens.remove(&id);
        }
        tables.tokens.insert(new_token.id, new_token.clone());
        Ok(new_token)
    }
}
