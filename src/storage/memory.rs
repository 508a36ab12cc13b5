//! In-memory metric store
//!
//! Holds the current value of every gauge and counter behind a single
//! exclusive lock. Every operation is one map access; no I/O ever happens
//! while the lock is held. Durability is provided separately by the snapshot
//! flusher.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tracing::trace;

use super::backend::MetricStorage;
use super::error::{StorageError, StorageResult};
use super::snapshot::Snapshot;
use crate::{MetricKind, MetricSample, MetricValue};

#[derive(Debug, Default)]
struct Records {
    gauge: HashMap<String, f64>,
    counter: HashMap<String, i64>,
}

/// In-memory storage backend
///
/// The maps are private, so the lock cannot be bypassed.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    records: Mutex<Records>,
}

impl MemoryStorage {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of records across both kinds
    pub fn len(&self) -> usize {
        let records = self.lock();
        records.gauge.len() + records.counter.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write `value` under `id` and return the stored result, in one
    /// critical section
    fn apply(&self, id: &str, value: MetricValue) -> StorageResult<MetricValue> {
        let mut records = self.lock();

        match value {
            MetricValue::Gauge(v) => {
                if records.counter.contains_key(id) {
                    return Err(StorageError::kind_conflict(id, MetricKind::Gauge));
                }
                trace!("gauge {id} = {v}");
                records.gauge.insert(id.to_string(), v);
                Ok(MetricValue::Gauge(v))
            }
            MetricValue::Counter(delta) => {
                if records.gauge.contains_key(id) {
                    return Err(StorageError::kind_conflict(id, MetricKind::Counter));
                }
                trace!("counter {id} += {delta}");
                let current = records.counter.entry(id.to_string()).or_insert(0);
                *current = current.saturating_add(delta);
                Ok(MetricValue::Counter(*current))
            }
        }
    }

    // A panic while holding the lock cannot leave a map half-updated, so the
    // data behind a poisoned lock is still valid.
    fn lock(&self) -> MutexGuard<'_, Records> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl MetricStorage for MemoryStorage {
    async fn add_gauge(&self, id: &str, value: f64) -> StorageResult<()> {
        self.apply(id, MetricValue::Gauge(value)).map(|_| ())
    }

    async fn add_counter(&self, id: &str, delta: i64) -> StorageResult<()> {
        self.apply(id, MetricValue::Counter(delta)).map(|_| ())
    }

    async fn get_gauge(&self, id: &str) -> StorageResult<f64> {
        self.lock()
            .gauge
            .get(id)
            .copied()
            .ok_or_else(|| StorageError::not_found(id, MetricKind::Gauge))
    }

    async fn get_counter(&self, id: &str) -> StorageResult<i64> {
        self.lock()
            .counter
            .get(id)
            .copied()
            .ok_or_else(|| StorageError::not_found(id, MetricKind::Counter))
    }

    async fn snapshot(&self) -> StorageResult<Snapshot> {
        let records = self.lock();
        Ok(Snapshot {
            gauge: records
                .gauge
                .iter()
                .map(|(id, value)| (id.clone(), *value))
                .collect(),
            counter: records
                .counter
                .iter()
                .map(|(id, value)| (id.clone(), *value))
                .collect(),
        })
    }

    fn name(&self) -> &'static str {
        "memory"
    }

    async fn record(&self, sample: &MetricSample) -> StorageResult<MetricValue> {
        sample.validate()?;
        self.apply(&sample.id, sample.value)
    }
}
