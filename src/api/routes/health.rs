//! Health check endpoint

use axum::{extract::State, http::StatusCode};
use tracing::warn;

use crate::api::state::ApiState;

/// GET /ping
///
/// 200 when the storage backend answers, 500 otherwise
pub async fn ping(State(state): State<ApiState>) -> StatusCode {
    match state.storage.health_check().await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            warn!("{} backend health check failed: {e}", state.storage.name());
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
