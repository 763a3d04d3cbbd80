//! CORS (Cross-Origin Resource Sharing) middleware configuration

use axum::http::{header, Method};
use tower_http::cors::{Any, CorsLayer as TowerCorsLayer};

/// Any origin may upload and fetch; downloads expose the headers a browser
/// needs to name the saved file.
pub fn cors_layer() -> TowerCorsLayer {
    TowerCorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
        .expose_headers([header::CONTENT_DISPOSITION, header::CONTENT_LENGTH])
        .max_age(std::time::Duration::from_secs(3600))
}
