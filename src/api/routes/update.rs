//! Ingestion endpoints

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
};
use tracing::{debug, instrument};

use crate::api::{error::ApiResult, state::ApiState};
use crate::{MetricPayload, MetricSample};

/// POST /update/:kind/:id/:value
///
/// Unknown kind answers 501, a value that does not parse answers 400.
#[instrument(skip(state))]
pub async fn update_path(
    State(state): State<ApiState>,
    Path((kind, id, value)): Path<(String, String, String)>,
) -> ApiResult<StatusCode> {
    let sample = MetricSample::parse(&kind, &id, &value)?;

    state.storage.record(&sample).await?;
    state.after_write();

    Ok(StatusCode::OK)
}

/// POST /update
///
/// Stores one JSON sample and answers with the record's value as left by this
/// write.
#[instrument(skip_all)]
pub async fn update_json(
    State(state): State<ApiState>,
    payload: Result<Json<MetricPayload>, JsonRejection>,
) -> ApiResult<Json<MetricPayload>> {
    let Json(payload) = payload?;
    let sample = MetricSample::try_from(payload)?;
    state.verify(&sample)?;

    let stored = state.storage.record(&sample).await?;
    state.after_write();

    Ok(Json(state.payload(&sample.id, stored)))
}

/// POST /updates
///
/// Every sample is decoded and verified before any of them is stored.
#[instrument(skip_all)]
pub async fn update_batch(
    State(state): State<ApiState>,
    payload: Result<Json<Vec<MetricPayload>>, JsonRejection>,
) -> ApiResult<StatusCode> {
    let Json(payloads) = payload?;

    let samples = payloads
        .into_iter()
        .map(MetricSample::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    for sample in &samples {
        state.verify(sample)?;
    }

    debug!("storing batch of {} samples", samples.len());
    state.storage.record_batch(&samples).await?;
    state.after_write();

    Ok(StatusCode::OK)
}
