//! Health check endpoint.

use axum::extract::State;
use axum::Json;

use crate::api::types::ApiContext;
use crate::core_state::HealthReport;

/// `GET /health`: liveness plus per-model load status. No side effects.
pub async fn check(State(ctx): State<ApiContext>) -> Json<HealthReport> {
    Json(ctx.core.health())
}
