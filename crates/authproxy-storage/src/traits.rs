//! The `Store` abstraction: pure CRUD with filter predicates over the five
//! record kinds, plus the one atomic primitive `OAuthEngine` needs to keep
//! concurrent token exchanges from corrupting each other.

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    error::StorageError,
    types::{Client, Grant, Patient, Token, User},
};

/// Outcome of a compare-and-swap token replacement.
///
/// Mirrors the "find basis, delete siblings, insert new" atomic unit the
/// concurrency model requires: a caller that observes [`CasOutcome::Conflict`]
/// lost the race to a concurrent exchange for the same `(client, user)` pair
/// and should retry, observing the winner's token on its next read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CasOutcome {
    /// The replacement was applied; carries the newly stored token.
    Applied(Token),
    /// A concurrent writer changed the basis set between the caller's read
    /// and this call; no change was made.
    Conflict,
}

/// Abstract persistence for Client, Grant, Token, User, and Patient records.
///
/// The sole shared mutable resource in the system; every other component
/// reaches storage only through this trait.
#[async_trait]
pub trait Store: Send + Sync {
    // -- Client ---------------------------------------------------------
    async fn create_client(&self, client: Client) -> Result<(), StorageError>;
    async fn find_client(&self, client_id: &str) -> Result<Option<Client>, StorageError>;
    async fn delete_client(&self, client_id: &str) -> Result<(), StorageError>;

    // -- User / Patient ---------------------------------------------------
    //
    // User self-registration over HTTP is out of scope, but accounts still
    // need to land in the store through some out-of-band admin path (a
    // fixture loader, a future admin CLI); these two methods are that path.
    async fn create_user(&self, user: User) -> Result<(), StorageError>;
    async fn create_patient(&self, patient: Patient) -> Result<(), StorageError>;
    async fn find_user_by_id(&self, user_id: i64) -> Result<Option<User>, StorageError>;
    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StorageError>;
    async fn find_patient(&self, patient_row_id: i64) -> Result<Option<Patient>, StorageError>;
    /// Looks up a patient by its FHIR resource id (`Patient::patient_id`)
    /// across all users, used by the debug token endpoint to distinguish
    /// "no such patient" from "patient belongs to someone else".
    async fn find_patient_by_fhir_id(&self, patient_id: &str) -> Result<Option<Patient>, StorageError>;
    async fn list_patients_for_user(&self, user_id: i64) -> Result<Vec<Patient>, StorageError>;

    // -- Grant ------------------------------------------------------------
    async fn create_grant(&self, grant: Grant) -> Result<(), StorageError>;
    /// Returns the grant only if `expires >= now`; an expired grant is
    /// treated as absent rather than returned for inspection.
    async fn find_grant(
        &self,
        client_id: &str,
        code: &str,
        now: OffsetDateTime,
    ) -> Result<Option<Grant>, StorageError>;
    /// Marks the grant unusable. Implementations are free to choose the
    /// mechanism (deletion, forced expiry) as long as a subsequent
    /// `find_grant` never returns it again.
    async fn consume_grant(&self, grant_id: Uuid, now: OffsetDateTime) -> Result<(), StorageError>;

    // -- Token reads --------------------------------------------------------
    async fn find_token_by_access(&self, access_token: &str) -> Result<Option<Token>, StorageError>;
    async fn find_token_by_refresh(
        &self,
        refresh_token: &str,
    ) -> Result<Option<Token>, StorageError>;
    async fn list_tokens_for_user(&self, user_id: i64) -> Result<Vec<Token>, StorageError>;
    async fn list_tokens_for_client(&self, client_id: &str) -> Result<Vec<Token>, StorageError>;
    async fn delete_token(&self, token_id: Uuid) -> Result<(), StorageError>;

    /// The token among `(client_id, user_id)` with `approval_expires >= now`
    /// whose `approval_expires` is the latest — the basis a subsequent
    /// issuance or refresh is built on top of. Read-only; does not itself
    /// provide atomicity, pair it with [`Store::replace_client_user_tokens`].
    async fn find_basis_token(
        &self,
        client_id: &str,
        user_id: i64,
        now: OffsetDateTime,
    ) -> Result<Option<Token>, StorageError>;

    /// Atomically: verify the current basis token id for `(client_id,
    /// user_id)` still matches `expected_basis_id`, delete every token for
    /// that pair with `approval_expires >= now`, and insert `new_token`.
    ///
    /// Returns [`CasOutcome::Conflict`] without mutating anything if the
    /// basis changed since the caller last read it via
    /// [`Store::find_basis_token`].
    async fn replace_client_user_tokens(
        &self,
        client_id: &str,
        user_id: i64,
        now: OffsetDateTime,
        expected_basis_id: Option<Uuid>,
        new_token: Token,
    ) -> Result<CasOutcome, StorageError>;

    /// Deletes every token for `client_id` (regardless of approval window)
    /// and inserts `new_token`. Used by `create_authorization`, which is
    /// unconditional by specification ("Deletes all existing tokens for
    /// that client_id").
    async fn replace_all_client_tokens(
        &self,
        client_id: &str,
        new_token: Token,
    ) -> Result<Token, StorageError>;
}
