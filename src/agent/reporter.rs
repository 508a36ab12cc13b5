//! Sends collected samples to the server

use std::time::Duration;

use tracing::{debug, instrument};

use crate::signing::Signer;
use crate::{MetricPayload, MetricSample};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// HTTP client for the batch ingestion endpoint
pub struct Reporter {
    client: reqwest::Client,
    endpoint: String,
    signer: Option<Signer>,
}

impl Reporter {
    pub fn new(base_url: &str, signer: Option<Signer>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/updates", base_url.trim_end_matches('/')),
            signer,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// POST the samples as one batch, signing each one if a key is set
    #[instrument(skip_all, fields(count = samples.len()))]
    pub async fn report(&self, samples: &[MetricSample]) -> anyhow::Result<()> {
        let payloads: Vec<MetricPayload> = samples
            .iter()
            .map(|sample| {
                let mut payload = MetricPayload::from(sample);
                if let Some(signer) = &self.signer {
                    payload.hash = Some(signer.sign(sample));
                }
                payload
            })
            .collect();

        self.client
            .post(&self.endpoint)
            .json(&payloads)
            .send()
            .await?
            .error_for_status()?;

        debug!("reported {} samples to {}", payloads.len(), self.endpoint);
        Ok(())
    }
}
