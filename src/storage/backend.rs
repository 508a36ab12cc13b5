//! Storage capability shared by the in-memory and relational variants
//!
//! Both variants expose the same five operations; the server picks one at
//! composition time and hands it around as `Arc<dyn MetricStorage>`.

use std::time::Duration;

use async_trait::async_trait;

use super::error::StorageResult;
use super::snapshot::Snapshot;
use crate::{MetricKind, MetricSample, MetricValue};

/// Trait for metric storage backends
///
/// ## Semantics
///
/// - `add_gauge` replaces the stored value
/// - `add_counter` adds the delta to the stored value (0 if absent)
/// - `get_*` fail with [`StorageError::NotFound`](super::StorageError::NotFound)
///   when no record of that kind exists
/// - `snapshot` returns a consistent copy of every record
/// - an id holds one kind only; writing the other kind fails with
///   [`StorageError::Validation`](super::StorageError::Validation)
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync` as they are shared between all
/// in-flight requests and the flush task.
#[async_trait]
pub trait MetricStorage: Send + Sync {
    async fn add_gauge(&self, id: &str, value: f64) -> StorageResult<()>;

    async fn add_counter(&self, id: &str, delta: i64) -> StorageResult<()>;

    async fn get_gauge(&self, id: &str) -> StorageResult<f64>;

    async fn get_counter(&self, id: &str) -> StorageResult<i64>;

    async fn snapshot(&self) -> StorageResult<Snapshot>;

    /// Short backend name for logging
    fn name(&self) -> &'static str;

    /// Apply a sample with the semantics of its kind and return the value
    /// stored afterwards
    ///
    /// Backends override this to read the value back inside the write itself.
    async fn record(&self, sample: &MetricSample) -> StorageResult<MetricValue> {
        sample.validate()?;
        match sample.value {
            MetricValue::Gauge(value) => self.add_gauge(&sample.id, value).await?,
            MetricValue::Counter(delta) => self.add_counter(&sample.id, delta).await?,
        }
        self.current(&sample.id, sample.kind()).await
    }

    /// Apply several samples in order
    ///
    /// The default applies them one by one; backends with transactions
    /// override this to make the batch all-or-nothing.
    async fn record_batch(&self, samples: &[MetricSample]) -> StorageResult<()> {
        for sample in samples {
            self.record(sample).await?;
        }
        Ok(())
    }

    /// Current value of a record, looked up by kind
    async fn current(&self, id: &str, kind: MetricKind) -> StorageResult<MetricValue> {
        match kind {
            MetricKind::Gauge => self.get_gauge(id).await.map(MetricValue::Gauge),
            MetricKind::Counter => self.get_counter(id).await.map(MetricValue::Counter),
        }
    }

    /// Lightweight liveness check
    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }

    /// Release backend resources
    async fn close(&self) -> StorageResult<()> {
        Ok(())
    }
}

/// Bounded retry policy for establishing the initial backend connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts (at least one is always made)
    pub max_attempts: u32,

    /// Fixed pause between two attempts
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(5),
        }
    }
}
