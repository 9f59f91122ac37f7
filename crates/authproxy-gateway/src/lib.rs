//! The request proxy pipeline: allow-list enforcement, `_security`
//! tag injection, upstream forwarding, and capability-statement
//! rewriting.

pub mod conformance;
pub mod error;
pub mod guard;
pub mod pipeline;
pub mod tagger;

pub use conformance::ConformanceRewriter;
pub use error::GatewayError;
pub use guard::RequestGuard;
pub use pipeline::{ProxyPipeline, ProxyRequest, ProxyResponse};
pub use tagger::SecurityTagger;
