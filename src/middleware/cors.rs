use axum::http::{header, Method};
use tower_http::cors::{Any, CorsLayer};

/// The test page is served from another origin and sends the candidate's
/// bearer token on every call.
pub fn session_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_origin(Any)
}
