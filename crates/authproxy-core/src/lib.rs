//! Core identifiers, clock abstraction, and shared error types for the
//! SMART-on-FHIR authorization proxy.

pub mod error;
pub mod id;
pub mod time;

pub use error::CoreError;
pub use id::generate_id;
pub use time::{Clock, SystemClock};
