//! The HTTP surface binding `authproxy-auth` and `authproxy-gateway` to the
//! inbound API: route wiring, request/response shaping, configuration, and
//! the server lifecycle.

pub mod config;
pub mod error;
pub mod http;
pub mod observability;
pub mod state;

use std::sync::Arc;

use authproxy_core::SystemClock;
use authproxy_storage::{InMemoryStore, Store};

pub use config::Config;
pub use observability::init_tracing;
pub use state::AppState;

/// The bound, ready-to-run server.
pub struct AuthProxyServer {
    addr: std::net::SocketAddr,
    app: axum::Router,
}

/// Builds an [`AuthProxyServer`] from a validated [`Config`].
pub struct ServerBuilder {
    config: Config,
}

impl ServerBuilder {
    /// Starts from `config`. Call [`ServerBuilder::build`] once it validates.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Validates the configuration, wires up the in-memory store and every
    /// collaborator, and builds the axum router.
    ///
    /// # Errors
    /// Returns the first `Config`/`OAuthConfig` validation failure.
    pub fn build(self) -> anyhow::Result<AuthProxyServer> {
        self.config.validate()?;
        self.config.oauth.validate()?;

        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let clock = Arc::new(SystemClock);
        let addr = self.config.bind_addr;
        let state = AppState::new(self.config, store, clock);
        let app = http::build_router(state);

        Ok(AuthProxyServer { addr, app })
    }
}

impl AuthProxyServer {
    /// Binds `addr` and serves until a shutdown signal (`Ctrl-C`) arrives.
    ///
    /// # Errors
    /// Returns the first bind or serve failure.
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!(addr = %self.addr, "listening");
        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        Ok(())
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
