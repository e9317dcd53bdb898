//! HTTP router.
//!
//! Layers (outermost → innermost): Trace → CORS → body limit → handler.
//! Persisted images are served read-only under `/storage`.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::api::endpoints;
use crate::api::types::ApiContext;
use crate::core_state::CoreState;

fn cors_layer(origin: &str) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origin == "*" {
        return layer.allow_origin(Any);
    }
    match HeaderValue::from_str(origin) {
        Ok(value) => layer.allow_origin(AllowOrigin::exact(value)),
        Err(_) => {
            tracing::warn!(origin, "Invalid CORS origin, cross-origin requests disabled");
            layer
        }
    }
}

/// Build the service router with every route mounted.
pub fn build_router(core: Arc<CoreState>) -> Router {
    let storage = ServeDir::new(&core.config.storage_dir);
    let body_limit = core.config.max_upload_bytes;
    let cors = cors_layer(&core.config.cors_origin);
    let ctx = ApiContext::new(core);

    Router::new()
        .route("/health", get(endpoints::health::check))
        .route("/ingest", post(endpoints::ingest::ingest))
        .route("/analyze", post(endpoints::analyze::analyze))
        .route(
            "/analyze-prescription",
            post(endpoints::analyze::analyze_prescription),
        )
        .nest_service("/storage", storage)
        .with_state(ctx)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
