//! Error types shared by every `authproxy-*` crate.

use thiserror::Error;

/// Errors that can arise from the identifier/clock/JSON primitives shared
/// across the workspace.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A value failed to parse as JSON.
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),

    /// A value failed to parse as a URL.
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    /// A timestamp failed to parse or format.
    #[error("invalid datetime: {0}")]
    Time(#[from] time::error::Format),
}
