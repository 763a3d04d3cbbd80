//! Core library for the file sharing service: lifecycle management, storage,
//! reclamation and the HTTP gateway.

pub mod auth;
pub mod clock;
pub mod config;
pub mod database;
pub mod error;
pub mod files;
pub mod handlers;
pub mod jobs;
pub mod middleware;
pub mod storage;

pub use auth::{JwtClaims, JwtService};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::AppConfig;
pub use database::{get_database_pool, run_migrations, DatabaseManager};
pub use error::{AppError, Result};
pub use files::{
    File, FileManager, FileManagerConfig, FileRepository, FileRepositoryTrait, FileUpload,
    MemoryFileRepository,
};
pub use handlers::routes::create_routes;
pub use jobs::{ReclamationConfig, ReclamationScheduler, SweepReport, SweepState};
pub use middleware::auth::{optional_jwt_auth_middleware, AuthUser};
pub use middleware::cors::cors_layer;
pub use storage::{BlobStore, FsBlobStore, MemoryBlobStore};

use axum::{extract::DefaultBodyLimit, middleware as axum_middleware, Router};
use std::{future::Future, net::SocketAddr};
use tokio::signal;
use tracing::info;

/// Room for multipart boundaries and text fields on top of the largest file.
const MULTIPART_OVERHEAD_BYTES: usize = 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub app_name: String,
    pub version: String,
    pub file_manager: FileManager,
    pub db_manager: Option<DatabaseManager>,
    pub jwt_service: Option<JwtService>,
    pub download_base_url: String,
    pub require_auth_for_upload: bool,
}

impl AppState {
    pub fn new(file_manager: FileManager) -> Self {
        Self {
            app_name: "File Share Server".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            file_manager,
            db_manager: None,
            jwt_service: None,
            download_base_url: config::settings::PublicConfig::default().download_base_url,
            require_auth_for_upload: false,
        }
    }

    pub fn with_database(mut self, db_manager: DatabaseManager) -> Self {
        self.db_manager = Some(db_manager);
        self
    }

    pub fn with_auth(mut self, jwt_service: JwtService) -> Self {
        self.jwt_service = Some(jwt_service);
        self
    }

    pub fn with_download_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.download_base_url = base_url.into();
        self
    }

    pub fn with_upload_auth_required(mut self, required: bool) -> Self {
        self.require_auth_for_upload = required;
        self
    }
}

pub fn create_app(state: AppState) -> Router {
    let body_limit = usize::try_from(state.file_manager.max_upload_size())
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD_BYTES);

    Router::new()
        .merge(create_routes())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::optional_jwt_auth_middleware,
        ))
        .layer(middleware::cors::cors_layer())
        .layer(middleware::logging::logging_layer())
        .with_state(state)
}

pub async fn run_server(app: Router, addr: SocketAddr) -> Result<()> {
    run_server_until(app, addr, shutdown_signal()).await
}

/// Serves until `shutdown` resolves, then drains in-flight requests.
pub async fn run_server_until<F>(app: Router, addr: SocketAddr, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
