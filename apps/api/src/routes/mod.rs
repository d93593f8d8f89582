pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::enhancement::handlers;
use crate::state::AppState;

/// Request bodies beyond this multiple of the upload ceiling are cut off by the
/// transport; anything smaller reaches the size check and gets a proper error.
const BODY_LIMIT_FACTOR: usize = 4;

pub fn build_router(state: AppState) -> Router {
    let body_limit = state
        .config
        .max_upload_bytes
        .saturating_mul(BODY_LIMIT_FACTOR);

    Router::new()
        .route("/health", get(health::health_handler))
        .route("/api/v1/enhance", post(handlers::handle_enhance))
        .route("/api/v1/sessions", post(handlers::handle_create_session))
        .route(
            "/api/v1/sessions/:id",
            get(handlers::handle_get_session).delete(handlers::handle_delete_session),
        )
        .route(
            "/api/v1/sessions/:id/upload",
            post(handlers::handle_upload),
        )
        .route(
            "/api/v1/sessions/:id/enhance",
            post(handlers::handle_session_enhance),
        )
        .route(
            "/api/v1/sessions/:id/download",
            get(handlers::handle_download),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}
