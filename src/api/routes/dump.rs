//! Full dump of the store

use axum::{Json, extract::State};

use crate::api::{error::ApiResult, state::ApiState};
use crate::storage::Snapshot;

/// GET /
///
/// Returns `{"Gauge": {...}, "Counter": {...}}`, the same shape as the
/// snapshot file.
pub async fn dump(State(state): State<ApiState>) -> ApiResult<Json<Snapshot>> {
    Ok(Json(state.storage.snapshot().await?))
}
