use tower_http::cors::{Any, CorsLayer};

/// Permissive CORS for the report proxy; browser frontends hit it directly.
pub fn dev() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}
