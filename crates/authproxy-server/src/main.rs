use authproxy_server::{Config, ServerBuilder, init_tracing};

#[tokio::main]
async fn main() {
    init_tracing();

    let config = Config::from_env();
    let server = match ServerBuilder::new(config).build() {
        Ok(server) => server,
        Err(err) => {
            tracing::error!(error = %err, "configuration invalid, refusing to start");
            std::process::exit(1);
        }
    };

    if let Err(err) = server.run().await {
        tracing::error!(error = %err, "server error");
        std::process::exit(1);
    }
}
