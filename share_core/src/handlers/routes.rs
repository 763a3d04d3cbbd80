//! Route table for the file sharing API

use crate::{
    handlers::{files, health},
    AppState,
};
use axum::{
    extract::State,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

pub fn create_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handle_root))
        .route("/health", get(health::handle_health))
        .route("/api/files", get(files::list_files).post(files::upload_file))
        // Reads address a file by download token, deletes by id.
        .route(
            "/api/files/:key",
            get(files::get_file_metadata).delete(files::delete_file),
        )
        .route("/api/files/:key/download", get(files::download_file))
}

async fn handle_root(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "app": state.app_name,
        "version": state.version,
        "endpoints": {
            "health": "/health",
            "upload": "POST /api/files",
            "list": "GET /api/files",
            "metadata": "GET /api/files/{token}",
            "download": "GET /api/files/{token}/download",
            "delete": "DELETE /api/files/{id}"
        }
    }))
}
