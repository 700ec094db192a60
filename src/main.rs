use std::sync::{Arc, Mutex};

use post_office_mcp::{build_app, config::Config, logging, store::PackageStore, AppState};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_logging();

    let config = Config::from_env()?;
    let store = PackageStore::load(&config.packages_csv_path)?;
    info!(
        csv_path = %config.packages_csv_path.display(),
        packages = store.len(),
        "package database loaded"
    );

    let bind_socket = config.bind_socket()?;
    let state = AppState::new(config.api_token.clone(), Arc::new(Mutex::new(store)));
    let app = build_app(state);
    let listener = tokio::net::TcpListener::bind(bind_socket).await?;

    info!(
        bind_addr = %config.bind_addr,
        bind_port = config.bind_port,
        "post office server starting"
    );

    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}
