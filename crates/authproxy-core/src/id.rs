//! Identifier generation.
//!
//! Client ids, client secrets, grant codes, access tokens, and refresh tokens
//! are all opaque random strings. A single `generate_id` is used everywhere
//! so the entropy source and format stay consistent.

use uuid::Uuid;

/// Generates a fresh random identifier suitable for client ids, client
/// secrets, grant codes, access tokens, and refresh tokens.
///
/// Backed by a UUIDv4; callers should treat the output as opaque.
#[must_use]
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_distinct_ids() {
        let a = generate_id();
        let b = generate_id();
        assert_ne!(a, b);
    }

    #[test]
    fn generates_uuid_shaped_ids() {
        let id = generate_id();
        assert_eq!(id.len(), 36);
        assert_eq!(id.matches('-').count(), 4);
    }
}
