//! Shared application state: the composition root binding Store, engine,
//! and gateway collaborators to every handler.

use std::sync::Arc;

use authproxy_auth::{ClientRegistry, OAuthEngine, PasswordHasher};
use authproxy_gateway::{ConformanceRewriter, ProxyPipeline, RequestGuard, SecurityTagger};
use authproxy_storage::Store;

use crate::config::Config;

/// Cloned into every handler via axum's `State` extractor; every field is
/// either `Arc`-shared or a stateless, `Copy` unit struct.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn Store>,
    pub clock: Arc<dyn authproxy_core::Clock>,
    pub registry: Arc<ClientRegistry>,
    pub engine: Arc<OAuthEngine>,
    pub hasher: Arc<PasswordHasher>,
    pub guard: RequestGuard,
    pub tagger: SecurityTagger,
    pub pipeline: Arc<ProxyPipeline>,
    pub conformance: Arc<ConformanceRewriter>,
}

impl AppState {
    /// Builds the full collaborator graph from a validated `config` and a
    /// storage backend.
    #[must_use]
    pub fn new(config: Config, store: Arc<dyn Store>, clock: Arc<dyn authproxy_core::Clock>) -> Self {
        let config = Arc::new(config);
        let registry = Arc::new(ClientRegistry::new(store.clone()));
        let engine = Arc::new(OAuthEngine::new(store.clone(), clock.clone(), config.oauth.clone()));
        Self {
            pipeline: Arc::new(ProxyPipeline::new(config.upstream_timeout)),
            conformance: Arc::new(ConformanceRewriter::new(config.upstream_timeout)),
            config,
            store,
            clock,
            registry,
            engine,
            hasher: Arc::new(PasswordHasher),
            guard: RequestGuard,
            tagger: SecurityTagger,
        }
    }
}
