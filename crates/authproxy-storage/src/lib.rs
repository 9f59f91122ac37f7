//! Storage abstraction for the auth proxy's domain records.
//!
//! [`Store`] is the sole shared mutable resource in the system (see the
//! concurrency model): `ClientRegistry`, `OAuthEngine`, and the HTTP facade
//! all reach the database exclusively through it. [`memory::InMemoryStore`]
//! is the reference backend, built around a compare-and-swap primitive so
//! that concurrent token exchanges for the same client/user pair serialize
//! instead of corrupting each other.

pub mod error;
pub mod memory;
pub mod traits;
pub mod types;

pub use error::StorageError;
pub use memory::InMemoryStore;
pub use traits::{CasOutcome, Store};
pub use types::{Client, Grant, Patient, Token, TokenInterest, User};
