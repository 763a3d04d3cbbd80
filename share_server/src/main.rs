//! Main entry point for the file sharing server binary

use anyhow::Result;
use share_core::{
    create_app, get_database_pool, run_migrations, run_server, AppConfig, AppState,
    DatabaseManager, FileManager, FileRepository, FsBlobStore, JwtService, ReclamationScheduler,
};
use std::{net::SocketAddr, sync::Arc};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = AppConfig::load()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

    info!("Configuration loaded successfully");
    info!("Server will bind to: {}", config.bind_address());
    info!("Database URL: {}", config.database.url);

    config.create_directories()
        .map_err(|e| anyhow::anyhow!("Failed to create directories: {}", e))?;

    let addr: SocketAddr = config.bind_address().parse()
        .map_err(|e| anyhow::anyhow!("Invalid bind address: {}", e))?;

    let (db_manager, file_manager) = initialize_storage(&config).await?;

    let jwt_service = JwtService::new(&config.auth.jwt_secret)
        .map_err(|e| anyhow::anyhow!("Failed to initialize JWT service: {}", e))?;

    let state = AppState::new(file_manager.clone())
        .with_database(db_manager)
        .with_auth(jwt_service)
        .with_download_base_url(config.public.download_base_url.clone())
        .with_upload_auth_required(config.auth.require_auth_for_upload);

    info!("App: {} v{}", state.app_name, state.version);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let reclamation = if config.reclamation.enabled {
        let scheduler = ReclamationScheduler::new(file_manager, config.reclamation_config());
        Some(scheduler.spawn(shutdown_rx))
    } else {
        warn!("Reclamation scheduler disabled; expired files will not be purged");
        None
    };

    let app = create_app(state);
    let served = run_server(app, addr).await;

    let _ = shutdown_tx.send(true);
    if let Some(handle) = reclamation {
        if let Err(e) = handle.await {
            warn!("Reclamation scheduler ended abnormally: {}", e);
        }
    }

    served?;
    info!("Server shutdown complete");
    Ok(())
}

async fn initialize_storage(config: &AppConfig) -> Result<(DatabaseManager, FileManager)> {
    let pool = get_database_pool(&config.database.url, config.database.max_connections)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create database pool: {}", e))?;

    run_migrations(pool.clone()).await
        .map_err(|e| anyhow::anyhow!("Failed to run database migrations: {}", e))?;

    let blobs = FsBlobStore::new(&config.storage.root_dir);
    blobs.initialize().await
        .map_err(|e| anyhow::anyhow!("Failed to initialize blob storage: {}", e))?;
    info!("Blob storage ready at {}", blobs.root().display());

    let file_manager = FileManager::new(
        config.file_manager_config(),
        Arc::new(FileRepository::new(pool.clone())),
        Arc::new(blobs),
    );

    info!("Database and blob storage initialized");
    Ok((DatabaseManager::new(pool), file_manager))
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| {
            let default_level = if cfg!(debug_assertions) {
                "debug"
            } else {
                "info"
            };

            format!(
                "{}={},share_core={},tower_http=info",
                env!("CARGO_CRATE_NAME").replace('-', "_"),
                default_level,
                default_level
            ).into()
        });

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_file(true)
        .with_line_number(true);

    let is_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    if is_json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer.json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer.pretty())
            .init();
    }
}
