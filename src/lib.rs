pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod interfaces;

use crate::infrastructure::config::AppConfig;
use crate::infrastructure::db::{init_schema, Store};
use crate::interfaces::http::{start_server, HttpState};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn init_tracing(config: &AppConfig) {
    // RUST_LOG wins over the configured filter
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Load configuration, open the store and serve the HTTP API until shutdown
pub async fn run() -> std::io::Result<()> {
    let _ = dotenvy::dotenv();

    let config = AppConfig::load().map_err(|e| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string())
    })?;
    init_tracing(&config);

    let store = Store::connect(&config.database_url, config.max_connections)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to open store");
            std::io::Error::new(std::io::ErrorKind::Other, e.to_string())
        })?;
    init_schema(&store).await.map_err(|e| {
        error!(error = %e, "Failed to initialize schema");
        std::io::Error::new(std::io::ErrorKind::Other, e.to_string())
    })?;

    info!(
        host = %config.http_host,
        port = config.http_port,
        "Starting datalens HTTP API"
    );
    let server = start_server(HttpState::new(store.clone(), config))?;
    let outcome = server.await;

    store.close().await;
    info!("Server stopped");
    outcome
}
