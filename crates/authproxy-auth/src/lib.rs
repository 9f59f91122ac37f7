//! The OAuth 2.0 authorization engine: client registry, grant/token
//! lifecycle, approval-window enforcement, SMART credential augmentation,
//! and password hashing.

pub mod config;
pub mod engine;
pub mod error;
pub mod password;
pub mod registry;

pub use authproxy_storage::{Client, Grant, Patient, Token, TokenInterest, User};
pub use config::OAuthConfig;
pub use engine::{AuthorizationOutcome, DebugTokenRequest, OAuthEngine, TokenResponse};
pub use error::AuthError;
pub use password::PasswordHasher;
pub use registry::{ClientRegistration, ClientRegistry};
