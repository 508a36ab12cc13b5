//! API shared state

use std::sync::Arc;

use crate::actors::FlushHandle;
use crate::api::error::{ApiError, ApiResult};
use crate::signing::Signer;
use crate::storage::MetricStorage;
use crate::{MetricPayload, MetricSample, MetricValue};

/// Shared state passed to all API handlers
#[derive(Clone)]
pub struct ApiState {
    /// Backend holding the current value of every record
    pub storage: Arc<dyn MetricStorage>,

    /// Present when the server was started with a key
    pub signer: Option<Signer>,

    /// Flush actor to poke after each write (write-through mode only)
    pub write_through: Option<FlushHandle>,
}

impl ApiState {
    pub fn new(storage: Arc<dyn MetricStorage>) -> Self {
        Self {
            storage,
            signer: None,
            write_through: None,
        }
    }

    pub fn with_signer(mut self, signer: Option<Signer>) -> Self {
        self.signer = signer;
        self
    }

    pub fn with_write_through(mut self, handle: FlushHandle) -> Self {
        self.write_through = Some(handle);
        self
    }

    /// Check the sample's hash against the server key
    ///
    /// Without a key every sample passes.
    pub fn verify(&self, sample: &MetricSample) -> ApiResult<()> {
        let Some(signer) = &self.signer else {
            return Ok(());
        };

        match sample.hash.as_deref() {
            None | Some("") => Err(ApiError::Integrity(format!(
                "{} metric {} has no hash",
                sample.kind(),
                sample.id
            ))),
            Some(tag) if !signer.verify(sample, tag) => Err(ApiError::Integrity(format!(
                "hash mismatch for {} metric {}",
                sample.kind(),
                sample.id
            ))),
            Some(_) => Ok(()),
        }
    }

    /// Response payload for a record, signed when a key is configured
    pub fn payload(&self, id: &str, value: MetricValue) -> MetricPayload {
        let mut payload = MetricPayload::from_value(id, value);
        if let Some(signer) = &self.signer {
            payload.hash = Some(signer.sign(&MetricSample {
                id: id.to_string(),
                value,
                hash: None,
            }));
        }
        payload
    }

    /// Called after every successful ingestion
    pub fn after_write(&self) {
        if let Some(handle) = &self.write_through {
            handle.request_flush();
        }
    }
}
