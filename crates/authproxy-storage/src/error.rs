//! Storage-layer error type.

use thiserror::Error;

/// Errors returned by [`crate::Store`] implementations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A write lost a compare-and-swap race after exhausting its retries.
    #[error("concurrent write conflict on client {client_id}/user {user_id}")]
    Conflict { client_id: String, user_id: i64 },

    /// A referenced row does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// An invariant the backend is responsible for enforcing was violated,
    /// e.g. a duplicate access token.
    #[error("storage invariant violated: {0}")]
    Invariant(String),

    /// The backend itself failed (connection, serialization, etc).
    #[error("storage backend error: {0}")]
    Backend(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_message_includes_kind_and_id() {
        let err = StorageError::NotFound {
            kind: "client",
            id: "abc".into(),
        };
        assert_eq!(err.to_string(), "client not found: abc");
    }
}
