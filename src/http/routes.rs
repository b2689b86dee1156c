use super::handlers;
use super::state::AppState;
use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue},
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::cors::{AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    let body_limit = state.settings.max_upload_bytes;
    let cors = cors_layer(&state.settings.allowed_origins);

    let router = Router::new()
        .route("/", get(handlers::home))
        // Health check
        .route("/health", get(handlers::health_check))
        // Session control
        .route("/start/", post(handlers::start_recording))
        .route("/start", post(handlers::start_recording))
        .route("/upload/", post(handlers::upload_audio))
        .route("/upload", post(handlers::upload_audio))
        .route("/stop/", post(handlers::stop_recording))
        .route("/stop", post(handlers::stop_recording))
        // Session queries
        .route("/transcript/", get(handlers::get_transcript))
        .route("/transcript", get(handlers::get_transcript))
        .route("/status/", get(handlers::get_status))
        .route("/status", get(handlers::get_status))
        .route("/save/", post(handlers::save_transcript))
        .route("/save", post(handlers::save_transcript))
        .layer(
            ServiceBuilder::new()
                // Add tracing middleware for request logging
                .layer(TraceLayer::new_for_http())
                .layer(DefaultBodyLimit::max(body_limit)),
        )
        .with_state(state);

    match cors {
        Some(cors) => router.layer(cors),
        None => router,
    }
}

fn cors_layer(origins: &[String]) -> Option<CorsLayer> {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    if origins.is_empty() {
        return None;
    }

    Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_credentials(true)
            .allow_methods(AllowMethods::mirror_request())
            .allow_headers([header::CONTENT_TYPE]),
    )
}
