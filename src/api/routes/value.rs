//! Lookup endpoints
//!
//! An unknown kind is answered with 404 here: nothing of that kind can exist.

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
};
use serde_json::Value;

use crate::api::{
    error::{ApiError, ApiResult},
    state::ApiState,
    types::MetricQuery,
};
use crate::{MetricKind, MetricPayload, MetricValue};

fn lookup_kind(kind: &str, id: &str) -> ApiResult<MetricKind> {
    kind.parse()
        .map_err(|_| ApiError::NotFound(format!("{kind} metric {id} not found")))
}

/// GET /value/:kind/:id
///
/// The bare value as a JSON number.
pub async fn value_path(
    State(state): State<ApiState>,
    Path((kind, id)): Path<(String, String)>,
) -> ApiResult<Json<Value>> {
    let kind = lookup_kind(&kind, &id)?;

    let value = match state.storage.current(&id, kind).await? {
        MetricValue::Gauge(v) => Value::from(v),
        MetricValue::Counter(d) => Value::from(d),
    };

    Ok(Json(value))
}

/// POST /value
pub async fn value_json(
    State(state): State<ApiState>,
    query: Result<Json<MetricQuery>, JsonRejection>,
) -> ApiResult<Json<MetricPayload>> {
    let Json(query) = query?;
    let kind = lookup_kind(&query.mtype, &query.id)?;

    let value = state.storage.current(&query.id, kind).await?;
    Ok(Json(state.payload(&query.id, value)))
}
